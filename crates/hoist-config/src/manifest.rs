//! Build manifest parsing.
//!
//! A manifest looks like:
//!
//! ```yaml
//! builder:
//!   track: dev
//! version:
//!   semver:
//!     major: 1
//!     minor: 2
//! labels:
//!   team: infra
//! pipelines:
//!   build:
//!     image: rust:1.85
//!     commands:
//!     - cargo build --release
//!   push:
//!     image: docker:cli
//!     repository: acme
//! releases:
//!   production:
//!     actions:
//!     - name: deploy-canary
//! ```
//!
//! Step and release order is significant, so `pipelines` and `releases`
//! are walked as ordered mappings. Each step is still deserialized into a
//! typed shape for defaulting; keys outside that shape are kept as custom
//! properties.
//!
//! Scalars are read loosely: `tier: 1` and `DEBUG: true` are the strings
//! `"1"` and `"true"`, and a null string field takes its default.

use hoist_core::manifest::{
    Builder, CustomVersion, DEFAULT_CUSTOM_LABEL_TEMPLATE, DEFAULT_RELEASE_BRANCH,
    DEFAULT_SEMVER_LABEL_TEMPLATE, DEFAULT_SEMVER_PATCH, DEFAULT_SHELL, DEFAULT_TRACK,
    DEFAULT_WHEN, DEFAULT_WORKING_DIRECTORY, Manifest, Release, ReleaseAction, SemverVersion,
    Step, VersionStrategy,
};
use serde::de::{self, DeserializeOwned, Deserializer, Visitor};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use crate::{ConfigError, ConfigResult};

const PIPELINES_KEY: &str = "pipelines";
const RELEASES_KEY: &str = "releases";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawManifest {
    builder: RawBuilder,
    version: RawVersion,
    #[serde(deserialize_with = "lenient_string_map")]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBuilder {
    #[serde(deserialize_with = "lenient_string")]
    track: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawVersion {
    semver: Option<RawSemver>,
    custom: Option<RawCustom>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawSemver {
    #[serde(deserialize_with = "lenient_i64")]
    major: i64,
    #[serde(deserialize_with = "lenient_i64")]
    minor: i64,
    #[serde(deserialize_with = "lenient_string")]
    patch: String,
    #[serde(deserialize_with = "lenient_string")]
    label_template: String,
    #[serde(deserialize_with = "lenient_string")]
    release_branch: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawCustom {
    #[serde(deserialize_with = "lenient_string")]
    label_template: String,
}

/// The schema of a step. Every key it accepts is reserved.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StepFields {
    #[serde(rename = "image", deserialize_with = "lenient_string")]
    container_image: String,
    #[serde(deserialize_with = "lenient_string")]
    shell: String,
    #[serde(rename = "workDir", deserialize_with = "lenient_string")]
    working_directory: String,
    #[serde(deserialize_with = "lenient_string_list")]
    commands: Vec<String>,
    #[serde(deserialize_with = "lenient_string")]
    when: String,
    #[serde(rename = "env", deserialize_with = "lenient_string_map")]
    env_vars: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRelease {
    actions: Vec<RawReleaseAction>,
}

#[derive(Debug, Deserialize)]
struct RawReleaseAction {
    #[serde(deserialize_with = "lenient_string")]
    name: String,
}

/// Manifest keys plus the step model's own field names in camelCase,
/// snake_case and PascalCase, so a stray `container_image` or `Name` never
/// leaks into custom properties.
static RESERVED_STEP_PROPERTIES: LazyLock<HashSet<String>> = LazyLock::new(|| {
    let mut reserved: HashSet<String> = struct_field_names::<StepFields>()
        .iter()
        .map(|name| name.to_string())
        .collect();
    for name in struct_field_names::<Step>() {
        reserved.insert(name.to_string());
        reserved.insert(snake_case(name));
        reserved.insert(pascal_case(name));
    }
    reserved
});

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if !out.is_empty() {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn pascal_case(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Names of the keys a derived `Deserialize` struct accepts.
///
/// serde hands the field list to `deserialize_struct`; this deserializer
/// records it and bails out.
fn struct_field_names<T: DeserializeOwned>() -> &'static [&'static str] {
    struct FieldNames<'a>(&'a mut &'static [&'static str]);

    impl<'de> Deserializer<'de> for FieldNames<'_> {
        type Error = de::value::Error;

        fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
            Err(de::Error::custom("expected a struct"))
        }

        fn deserialize_struct<V: Visitor<'de>>(
            self,
            _name: &'static str,
            fields: &'static [&'static str],
            _visitor: V,
        ) -> Result<V::Value, Self::Error> {
            *self.0 = fields;
            Err(de::Error::custom("field names collected"))
        }

        serde::forward_to_deserialize_any! {
            bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
            bytes byte_buf option unit unit_struct newtype_struct seq tuple
            tuple_struct map enum identifier ignored_any
        }
    }

    let mut fields: &'static [&'static str] = &[];
    let _ = T::deserialize(FieldNames(&mut fields));
    fields
}

/// A YAML scalar as a string; null reads as empty.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Tagged(tagged) => scalar_string(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    scalar_string(&value)
        .ok_or_else(|| de::Error::custom(format!("expected a string, found {}", kind(&value))))
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| de::Error::custom(format!("expected an integer, found {}", n))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("expected an integer, found '{}'", s))),
        other => Err(de::Error::custom(format!(
            "expected an integer, found {}",
            kind(&other)
        ))),
    }
}

fn lenient_string_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items
            .iter()
            .map(|item| {
                scalar_string(item).ok_or_else(|| {
                    de::Error::custom(format!("expected a string item, found {}", kind(item)))
                })
            })
            .collect(),
        other => Err(de::Error::custom(format!(
            "expected a sequence, found {}",
            kind(&other)
        ))),
    }
}

fn lenient_string_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(BTreeMap::new()),
        Value::Mapping(mapping) => mapping
            .iter()
            .map(|(key, value)| match (scalar_string(key), scalar_string(value)) {
                (Some(key), Some(value)) => Ok((key, value)),
                (None, _) => Err(de::Error::custom(format!(
                    "expected a string key, found {}",
                    kind(key)
                ))),
                (_, None) => Err(de::Error::custom(format!(
                    "expected a string value, found {}",
                    kind(value)
                ))),
            })
            .collect(),
        other => Err(de::Error::custom(format!(
            "expected a mapping, found {}",
            kind(&other)
        ))),
    }
}

/// Whether `key` is a schema field of a pipeline step.
pub fn is_reserved_step_property(key: &str) -> bool {
    RESERVED_STEP_PROPERTIES.contains(key)
}

/// Parse manifest text into a defaulted [`Manifest`].
pub fn parse_manifest(text: &str) -> ConfigResult<Manifest> {
    let document: Value = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_yaml::from_str(text)?
    };

    let root = match document {
        Value::Null => Mapping::new(),
        Value::Mapping(mapping) => mapping,
        other => {
            return Err(ConfigError::InvalidValue {
                field: "manifest".to_string(),
                message: format!("expected a mapping, found {}", kind(&other)),
            });
        }
    };

    let raw: RawManifest = serde_yaml::from_value(Value::Mapping(root.clone()))?;

    let pipelines = match root.get(PIPELINES_KEY) {
        Some(value) => parse_steps(value)?,
        None => Vec::new(),
    };
    let releases = match root.get(RELEASES_KEY) {
        Some(value) => parse_releases(value)?,
        None => Vec::new(),
    };

    Ok(Manifest {
        builder: Builder {
            track: or_default(raw.builder.track, DEFAULT_TRACK),
        },
        version: resolve_version(raw.version),
        labels: raw.labels,
        pipelines,
        releases,
    })
}

fn resolve_version(raw: RawVersion) -> VersionStrategy {
    // A custom template wins when both strategies are declared.
    if let Some(custom) = raw.custom {
        return VersionStrategy::Custom(CustomVersion {
            label_template: or_default(custom.label_template, DEFAULT_CUSTOM_LABEL_TEMPLATE),
        });
    }

    match raw.semver {
        Some(semver) => VersionStrategy::Semver(SemverVersion {
            major: semver.major,
            minor: semver.minor,
            patch: or_default(semver.patch, DEFAULT_SEMVER_PATCH),
            label_template: or_default(semver.label_template, DEFAULT_SEMVER_LABEL_TEMPLATE),
            release_branch: or_default(semver.release_branch, DEFAULT_RELEASE_BRANCH),
        }),
        None => VersionStrategy::default(),
    }
}

fn parse_steps(value: &Value) -> ConfigResult<Vec<Step>> {
    let Some(steps) = as_ordered_mapping(value, PIPELINES_KEY)? else {
        return Ok(Vec::new());
    };

    let mut pipelines = Vec::with_capacity(steps.len());
    for (key, value) in steps {
        let name = key_name(key, PIPELINES_KEY)?;
        pipelines.push(parse_step(name, value)?);
    }
    Ok(pipelines)
}

fn parse_step(name: String, value: &Value) -> ConfigResult<Step> {
    let properties = as_ordered_mapping(value, &name)?.cloned().unwrap_or_default();
    let fields: StepFields = serde_yaml::from_value(Value::Mapping(properties.clone()))?;

    let mut custom_properties = BTreeMap::new();
    for (key, value) in &properties {
        let key = key_name(key, &name)?;
        if !is_reserved_step_property(&key) {
            custom_properties.insert(key, value.clone());
        }
    }

    Ok(Step {
        name,
        container_image: fields.container_image,
        shell: or_default(fields.shell, DEFAULT_SHELL),
        working_directory: or_default(fields.working_directory, DEFAULT_WORKING_DIRECTORY),
        commands: fields.commands,
        when: or_default(fields.when, DEFAULT_WHEN),
        env_vars: fields.env_vars,
        custom_properties,
    })
}

fn parse_releases(value: &Value) -> ConfigResult<Vec<Release>> {
    let Some(targets) = as_ordered_mapping(value, RELEASES_KEY)? else {
        return Ok(Vec::new());
    };

    let mut releases = Vec::with_capacity(targets.len());
    for (key, value) in targets {
        let name = key_name(key, RELEASES_KEY)?;
        let raw: RawRelease = match value {
            Value::Null => RawRelease::default(),
            other => serde_yaml::from_value(other.clone())?,
        };
        releases.push(Release {
            name,
            actions: raw
                .actions
                .into_iter()
                .map(|a| ReleaseAction { name: a.name })
                .collect(),
        });
    }
    Ok(releases)
}

/// `None` for an empty (null) section.
fn as_ordered_mapping<'a>(value: &'a Value, field: &str) -> ConfigResult<Option<&'a Mapping>> {
    match value {
        Value::Null => Ok(None),
        Value::Mapping(mapping) => Ok(Some(mapping)),
        other => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("expected a mapping, found {}", kind(other)),
        }),
    }
}

fn key_name(key: &Value, field: &str) -> ConfigResult<String> {
    key.as_str()
        .map(str::to_string)
        .ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("keys must be strings, found {}", kind(key)),
        })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

fn or_default(value: String, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}
