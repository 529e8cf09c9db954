fn main() {
    if let Err(err) = placement_metrics::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
