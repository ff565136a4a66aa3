fn main() {
    if let Err(err) = csv_map::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
