use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = factstack_api::Args::parse();

	factstack_api::run(args).await
}
