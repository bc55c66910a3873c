fn main() {
    let exit_code = match remake::run::run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("remake: error: {:#}", err);
            1
        }
    };
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}
