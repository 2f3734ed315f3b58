// Embedder-facing runtime configuration.

use ron::de::from_reader;
use serde::Deserialize;
use std::fs::File;


// Capacities are denominated in object slots for the stack and in
// bytes for the heap. The heap capacity is not a hard allocation
// limit: it is the threshold past which an allocation triggers a
// collection first.
#[derive(Deserialize, Debug, Copy, Clone)]
pub struct Config {
    pub stack_capacity: usize,
    pub heap_capacity: usize,
}


impl Default for Config {
    fn default() -> Config {
        Config {
            stack_capacity: 1024,
            heap_capacity: 1 << 20,
        }
    }
}


#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
}


pub type LoadResult = std::result::Result<Config, ConfigError>;


pub fn load(path: String) -> LoadResult {
    match File::open(&path) {
        Ok(file) => match from_reader(file) {
            Ok(config) => Ok(config),
            Err(e) => Err(ConfigError::Parse(format!("{}: {}", path, e))),
        },
        Err(e) => Err(ConfigError::Io(format!("{}: {}", path, e))),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let config = Config::default();
        assert_eq!(config.stack_capacity, 1024);
        assert_eq!(config.heap_capacity, 1 << 20);
    }

    #[test]
    fn test_parse() {
        let config: Config = ron::de::from_str(
            "(stack_capacity: 64, heap_capacity: 4096)"
        ).unwrap();
        assert_eq!(config.stack_capacity, 64);
        assert_eq!(config.heap_capacity, 4096);
    }
}
