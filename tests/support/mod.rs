//! A minimal in-memory [`Loader`] used only by this crate's own integration tests. Providing a
//! real loader (filesystem, database, ...) is a hosting concern the core deliberately leaves out.

use std::collections::HashMap;
use std::sync::Mutex;
use twigrs::Loader;

pub struct MapLoader(Mutex<HashMap<String, String>>);

impl MapLoader {
    pub fn new(templates: &[(&str, &str)]) -> Self {
        Self(Mutex::new(templates.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()))
    }
}

impl Loader for MapLoader {
    fn load(&self, name: &str) -> Option<String> {
        self.0.lock().unwrap().get(name).cloned()
    }
}

#[allow(dead_code)]
pub fn engine_with(templates: &[(&str, &str)]) -> twigrs::Engine {
    use std::sync::Arc;
    let engine = twigrs::Engine::new(twigrs::EngineOptions::default());
    engine.add_loader(Arc::new(MapLoader::new(templates)));
    engine
}
