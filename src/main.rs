use env_logger::Env;

mod app;
mod arch;
mod candidates;
mod config;
mod correlate;
mod dispatch;
mod pool;
mod prelude;
mod procdump;

fn main() {
    env_logger::Builder::from_env(Env::new().filter_or("POOLDUMP_LOG", "info")).init();
    if let Err(err) = app::run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
