use clap::Parser;

fn main() -> anyhow::Result<()> {
    // Load .env early; ignore if missing.
    dotenvy::dotenv().ok();

    let cli = repo_index::Cli::parse();
    repo_index::cli::run(cli)
}
