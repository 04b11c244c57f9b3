fn main() {
    if let Err(err) = sheetsense::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
