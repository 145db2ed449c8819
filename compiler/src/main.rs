use vesperc::cli;
use vesperc::runtime;

fn main() {
    runtime::init();
    let code = cli::run();
    runtime::shutdown();
    std::process::exit(code);
}
