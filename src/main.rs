use anyhow::Result;
use clap::Parser;
use treesums::cli::{self, UpdateCli};

fn main() -> Result<()> {
    cli::init_colors();
    UpdateCli::parse().run()
}
