fn main() {
    if let Err(err) = csv_binpack::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
