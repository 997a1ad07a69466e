use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub sandbox: SandboxSettings,
    pub weather: WeatherConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// SQLite database file. `:memory:` keeps everything in-process.
    pub database_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxSettings {
    /// Whether to connect to the isolation host at all.
    pub enabled: bool,
    pub image: String,
    pub memory_limit_bytes: i64,
    pub cpu_quota: i64,
    pub timeout_secs: u64,
    /// Base URL under which isolates reach the call-back proxy.
    /// When unset, `execute_code` reports the channel as unavailable.
    pub proxy_url: Option<String>,
    /// Docker network the isolate joins. `none` and `bridge` keep their
    /// Docker meaning; any other name is an internal network with no route
    /// out, created on first use.
    pub network: String,
    /// Container serving the proxy, attached to the internal network so
    /// isolates can reach it by name.
    pub proxy_container: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WeatherConfig {
    pub geocoding_url: String,
    pub forecast_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    pub json_logs: bool,
    pub log_filter: String,
    pub metrics_enabled: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("CODEMODE_ENV").unwrap_or_else(|_| "development".into());

        let s = Self::with_defaults(Config::builder())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map APP__SERVER__PORT=3000 to server.port
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Address the HTTP listener binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Seed a builder with [`AppConfig::default`] so every file layer is optional.
    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let d = Self::default();
        builder
            .set_default("server.host", d.server.host)?
            .set_default("server.port", i64::from(d.server.port))?
            .set_default("server.enable_cors", d.server.enable_cors)?
            .set_default("store.database_path", d.store.database_path)?
            .set_default("sandbox.enabled", d.sandbox.enabled)?
            .set_default("sandbox.image", d.sandbox.image)?
            .set_default("sandbox.memory_limit_bytes", d.sandbox.memory_limit_bytes)?
            .set_default("sandbox.cpu_quota", d.sandbox.cpu_quota)?
            .set_default("sandbox.timeout_secs", d.sandbox.timeout_secs)?
            .set_default("sandbox.network", d.sandbox.network)?
            .set_default("weather.geocoding_url", d.weather.geocoding_url)?
            .set_default("weather.forecast_url", d.weather.forecast_url)?
            .set_default("weather.timeout_secs", d.weather.timeout_secs)?
            .set_default("telemetry.json_logs", d.telemetry.json_logs)?
            .set_default("telemetry.log_filter", d.telemetry.log_filter)?
            .set_default("telemetry.metrics_enabled", d.telemetry.metrics_enabled)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8787,
                enable_cors: true,
            },
            store: StoreConfig {
                database_path: "codemode.db".into(),
            },
            sandbox: SandboxSettings {
                enabled: true,
                image: "node:20-alpine".into(),
                memory_limit_bytes: 128 * 1024 * 1024, // 128MB
                cpu_quota: 50_000,                     // half a core
                timeout_secs: 30,
                proxy_url: None,
                network: "codemode-isolates".into(),
                proxy_container: None,
            },
            weather: WeatherConfig {
                geocoding_url: "https://geocoding-api.open-meteo.com/v1/search".into(),
                forecast_url: "https://api.open-meteo.com/v1/forecast".into(),
                timeout_secs: 10,
            },
            telemetry: TelemetryConfig {
                json_logs: false,
                log_filter: "info,codemode=debug".into(),
                metrics_enabled: true,
            },
        }
    }
}
