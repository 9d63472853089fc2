use anyhow::Result;
use colored::Colorize;

use crate::cli::ConfigCmd;
use crate::config::Config;

pub fn handle(cmd: ConfigCmd) -> Result<()> {
    let path = Config::path()?;
    let mut cfg = Config::load(&path)?;

    match cmd {
        ConfigCmd::List => {
            if cfg.map.is_empty() {
                println!("{}", "(empty config)".dimmed());
                return Ok(());
            }

            for (key, val) in &cfg.map {
                println!("{} = {}", key.bold(), val);
            }
        }

        ConfigCmd::Get { key } => match cfg.get(&key) {
            Some(val) => println!("{val}"),
            None => println!("{} key `{}` is not set", "error:".red().bold(), key),
        },

        ConfigCmd::Set { key, val } => {
            cfg.map.insert(key.clone(), val);
            cfg.save(&path)?;
            println!("{} set `{}`", "ok:".green().bold(), key);
        }

        ConfigCmd::Unset { key } => {
            if cfg.map.remove(&key).is_none() {
                println!("{} key `{}` is not set", "error:".red().bold(), key);
                return Ok(());
            }
            cfg.save(&path)?;
            println!("{} removed `{}`", "ok:".green().bold(), key);
        }
    }

    Ok(())
}
