use anyhow::Result;
use ccmigrate::{Ccmigrate, Config};
use console::style;
use std::process::exit;

pub fn main() {
    if let Err(e) = run() {
        println!(
            "{}{}{} {}",
            style("[").white().dim(),
            style("ERROR").red(),
            style("]").white().dim(),
            e.chain()
                .map(|x| x.to_string())
                .collect::<Vec<_>>()
                .join(": ")
        );
        exit(1);
    }
}

fn run() -> Result<()> {
    let config = Config::from_args()?;
    Ccmigrate::run(config)
}
