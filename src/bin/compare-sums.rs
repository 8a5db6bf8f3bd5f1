use anyhow::Result;
use clap::Parser;
use treesums::cli::CompareCli;

fn main() -> Result<()> {
    CompareCli::parse().run()
}
