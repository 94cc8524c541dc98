use std::sync::Arc;

use factstack_service::Engine;

#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<Engine>,
}
impl AppState {
	pub fn new(config: factstack_config::Config) -> color_eyre::Result<Self> {
		let engine = Engine::from_config(config)?;

		Ok(Self::from_engine(engine))
	}

	pub fn from_engine(engine: Engine) -> Self {
		Self { engine: Arc::new(engine) }
	}
}
