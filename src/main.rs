use refsync::ui::output;

fn main() {
    if let Err(err) = refsync::cli::run() {
        output::error(format!("{:#}", err));
        std::process::exit(1);
    }
}
