use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = factstack_ask::Args::parse();

	factstack_ask::run(args).await
}
