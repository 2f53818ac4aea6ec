pub use self::parser::{
    AuthConfig, BridgeConfig, Config, IdentityConfig, LimitsConfig, LoggingConfig, MappingsConfig,
    StoatConfig,
};
pub use self::validator::ConfigError;

mod parser;
mod validator;
