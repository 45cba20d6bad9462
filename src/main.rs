mod actions;
mod cli;
mod logging;
mod pipeline;
mod profile;
mod trace;

fn main() -> anyhow::Result<()> {
    cli::run()
}
