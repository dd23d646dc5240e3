//! Environment-backed configuration.
//!
//! Variables are fed to serde as a string map, in the style of the [`envy`] crate, so `Env`
//! can lean on derive attributes for names and defaults.
//!
//! [`envy`]: https://github.com/softprops/envy

use std::str::FromStr;
use std::sync::LazyLock;

use chrono_tz::Tz;
use serde::Deserialize;
use serde::de::value::MapDeserializer;
use serde::de::{self, IntoDeserializer};
use thiserror::Error;
use tokio::sync::OnceCell;

static ENV_VARS: LazyLock<OnceCell<Env>> = LazyLock::new(OnceCell::new);

/// Loads (once) and returns the process configuration.
pub async fn env() -> EnvResult<&'static Env> {
    ENV_VARS.get_or_try_init(|| async { Env::new() }).await
}

/// Whether a failed streak update should undo the ranking write that triggered it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreakWritePolicy {
    /// The ranking is committed first; the streak update runs in its own transaction.
    #[default]
    Independent,
    /// The ranking and the streak update share one transaction.
    Atomic,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Env {
    pub database_url: String,
    pub internal_token: String,
    #[serde(default = "default_port")]
    pub server_api_port: u16,
    #[serde(default = "default_cors")]
    pub cors_allow_origins: String,
    #[serde(default = "default_timezone")]
    pub streak_timezone: String,
    #[serde(default)]
    pub streak_write_policy: StreakWritePolicy,
    #[serde(default = "default_true")]
    pub streak_reset_scheduler: bool,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,
    #[serde(default = "default_service_name")]
    pub api_service_name: String,
    #[serde(default = "default_tracer_name")]
    pub api_tracer_name: String,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

#[inline]
const fn default_port() -> u16 {
    8080
}

#[inline]
const fn default_true() -> bool {
    true
}

fn default_cors() -> String {
    String::from("*")
}

fn default_timezone() -> String {
    String::from("America/Puerto_Rico")
}

fn default_service_name() -> String {
    String::from("ranktify-api")
}

fn default_tracer_name() -> String {
    String::from("ranktify-tracer")
}

fn default_log_filter() -> String {
    String::from("ranktify_server=debug,tower_http=debug,axum=debug,sqlx=info,info")
}

impl Env {
    pub fn new() -> EnvResult<Self> {
        Ok(from_env::<Env>()?)
    }

    /// Parses the configured streak timezone. Never falls back to UTC.
    pub fn reference_timezone(&self) -> EnvResult<Tz> {
        Tz::from_str(&self.streak_timezone)
            .map_err(|e| EnvErr::Timezone(format!("'{}': {e}", self.streak_timezone)))
    }
}

// ---
//  Deserializer implementation
// ---

/// A variable name, handed to serde as a map key.
struct EnvKey(String);

/// A raw variable value, tagged with its name for error messages.
struct EnvValue {
    key: String,
    raw: String,
}

impl EnvValue {
    fn parse_err<E: std::fmt::Display>(&self, e: E) -> EnvDeserializeError {
        de::Error::custom(format_args!("{e}: while parsing '{}' ({})", self.raw, self.key))
    }
}

impl<'de> IntoDeserializer<'de, EnvDeserializeError> for EnvKey {
    type Deserializer = Self;
    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

impl<'de> IntoDeserializer<'de, EnvDeserializeError> for EnvValue {
    type Deserializer = Self;
    fn into_deserializer(self) -> Self::Deserializer {
        self
    }
}

macro_rules! parse_then_forward {
    ($($ty:ident => $method:ident,)*) => {
        $(
            fn $method<V>(self, visitor: V) -> Result<V::Value, EnvDeserializeError>
            where
                V: de::Visitor<'de>
            {
                let parsed = self.raw.trim().parse::<$ty>().map_err(|e| self.parse_err(e))?;
                parsed.into_deserializer().$method(visitor)
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for EnvValue {
    type Error = EnvDeserializeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        self.raw.into_deserializer().deserialize_any(visitor)
    }

    /// Blank values count as unset.
    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        match self.raw.trim().is_empty() {
            true => visitor.visit_none(),
            false => visitor.visit_some(self),
        }
    }

    /// Unit variants only, matched case-insensitively against lowercase names.
    fn deserialize_enum<V>(
        self,
        _: &'static str,
        _: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_enum(self.raw.trim().to_lowercase().into_deserializer())
    }

    fn deserialize_newtype_struct<V>(
        self,
        _: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    parse_then_forward! {
        bool => deserialize_bool,
        u8 => deserialize_u8,
        u16 => deserialize_u16,
        u32 => deserialize_u32,
        u64 => deserialize_u64,
        i32 => deserialize_i32,
        i64 => deserialize_i64,
    }

    serde::forward_to_deserialize_any! {
        i8 i16 f32 f64 char str string unit seq bytes byte_buf map
        unit_struct tuple_struct identifier tuple ignored_any struct
    }
}

impl<'de> de::Deserializer<'de> for EnvKey {
    type Error = EnvDeserializeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        visitor.visit_string(self.0)
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 u8 u16 u32 u64 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map struct enum identifier ignored_any
    }
}

/// Presents `(name, value)` pairs as a map so a derived `Deserialize` struct can pick the
/// fields it knows and skip the rest.
struct VarsDeserializer<I> {
    vars: I,
}

impl<'de, I> de::Deserializer<'de> for VarsDeserializer<I>
where
    I: Iterator<Item = (String, String)>,
{
    type Error = EnvDeserializeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: de::Visitor<'de>,
    {
        let pairs = self
            .vars
            .map(|(key, raw)| (EnvKey(key.clone()), EnvValue { key, raw }));

        let mut map = MapDeserializer::new(pairs);
        let value = visitor.visit_map(&mut map)?;
        map.end()?;

        Ok(value)
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 u8 u16 u32 u64 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map struct enum identifier ignored_any
    }
}

/// Reads `.env` (if any) plus the process environment into `T`.
pub fn from_env<T>() -> Result<T, EnvDeserializeError>
where
    T: de::DeserializeOwned,
{
    from_iter(dotenvy::vars())
}

pub fn from_iter<Iter, T>(iter: Iter) -> Result<T, EnvDeserializeError>
where
    T: de::DeserializeOwned,
    Iter: IntoIterator<Item = (String, String)>,
{
    T::deserialize(VarsDeserializer {
        vars: iter.into_iter(),
    })
}

impl de::Error for EnvDeserializeError {
    fn custom<T>(msg: T) -> Self
    where
        T: std::fmt::Display,
    {
        EnvDeserializeError::Custom(msg.to_string())
    }

    fn missing_field(field: &'static str) -> Self {
        EnvDeserializeError::MissingValue(field.into())
    }
}

pub type EnvResult<T> = core::result::Result<T, EnvErr>;

#[derive(Debug, Error)]
pub enum EnvErr {
    #[error(transparent)]
    DeserializationError(#[from] EnvDeserializeError),

    #[error("unable to load reference timezone {0}")]
    Timezone(String),
}

#[derive(Debug, Error)]
pub enum EnvDeserializeError {
    #[error("env deserialization error: {0}")]
    Custom(String),

    #[error("missing environment variable {0}")]
    MissingValue(String),
}
