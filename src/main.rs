fn main() {
    if let Err(err) = csv_stager::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
