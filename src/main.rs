fn main() {
    if let Err(err) = crate_evolve::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
