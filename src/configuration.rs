use secrecy::Secret;
use serde_aux::field_attributes::deserialize_number_from_string;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub store: StoreSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
}

/// Connection details for the remote contents store holding the one
/// document this service edits.
#[derive(serde::Deserialize, Clone)]
pub struct StoreSettings {
    /// Full URL of the contents-API resource, e.g.
    /// `https://api.github.com/repos/<owner>/<repo>/contents/data.json`.
    pub endpoint: String,
    pub token: Secret<String>,
    pub commit_message: String,
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let mut settings = config::Config::default();
    settings.merge(config::File::with_name("configuration"))?;
    // APP__STORE__ENDPOINT and APP__STORE__TOKEN are the two values
    // expected to come from the environment in production.
    settings.merge(config::Environment::with_prefix("app").separator("__"))?;
    settings.try_into()
}
