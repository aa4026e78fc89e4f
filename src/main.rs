use bfind::{ParseError, eval_cmdline, parse_cmdline};
use std::ffi::OsString;
use std::process;

fn main() {
    let args: Vec<OsString> = std::env::args_os().collect();

    let cmdline = match parse_cmdline(&args) {
        Ok(cmdline) => cmdline,
        Err(ParseError::Info) => process::exit(0),
        Err(ParseError::Fatal) => process::exit(1),
    };

    let status = eval_cmdline(&cmdline);
    process::exit(i32::from(status != 0));
}
