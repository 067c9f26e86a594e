//! Man pages for rservod
//!
//! Writes `rservod.1` plus one `rservod-<command>.1` page per subcommand.
//! The main page ends with the interface spec syntax and the adapters
//! compiled into this build.
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::CommandFactory;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

#[path = "../cli.rs"]
mod cli;

/// Interface spec grammar and the adapters of this build
fn interfaces_section() -> String {
    let mut text = String::from(
        "INTERFACES\n\n\
         Each -i NAME[:KEY=VALUE,...] opens one adapter. Slots are numbered from 1 \
         in the order given, and a control's 'interface' param picks its slot. \
         An adapter may fill several consecutive slots (dummy fills three).\n\n\
         Example: rservod -c board.toml -i linux_gpio:gpiochip=0,lines=0-7 -i linux_i2c:bus=2 get ppvar_vbus_mv\n\n\
         Adapters in this build:\n",
    );
    for info in rservo_interfaces::available_interfaces() {
        let _ = write!(text, "\n  {}", info.name);
        if !info.aliases.is_empty() {
            let _ = write!(text, " ({})", info.aliases.join(", "));
        }
        let _ = writeln!(text, "\n      {}", info.description);
    }
    text
}

fn render(cmd: clap::Command, title: &str, path: &Path) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    clap_mangen::Man::new(cmd)
        .title(title.to_uppercase())
        .manual("rservod manual")
        .render(&mut buffer)?;
    fs::write(path, buffer)?;
    println!("  {}", path.display());
    Ok(())
}

fn main() -> std::io::Result<()> {
    let output_dir = std::env::args().nth(1).map_or_else(|| PathBuf::from("man"), PathBuf::from);
    fs::create_dir_all(&output_dir)?;

    let mut cmd = cli::Cli::command().after_long_help(interfaces_section());
    cmd.build();

    println!("Writing man pages to {}:", output_dir.display());
    render(cmd.clone(), "rservod", &output_dir.join("rservod.1"))?;
    for sub in cmd.get_subcommands().filter(|s| s.get_name() != "help") {
        let page = format!("rservod-{}", sub.get_name());
        render(sub.clone(), &page, &output_dir.join(format!("{}.1", page)))?;
    }

    println!("\nView with: man -l {}", output_dir.join("rservod.1").display());
    Ok(())
}
