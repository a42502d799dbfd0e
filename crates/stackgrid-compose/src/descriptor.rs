//! Service enumeration from a project's compose descriptor files.

use std::path::Path;

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::error::{ComposeError, ComposeResult};

/// Descriptor files read, in order. Later files add services and override
/// images of earlier ones.
pub const DESCRIPTOR_FILES: [&str; 2] = ["docker-compose.yml", "docker-compose.prod.yml"];

/// One sub-service declared by a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDef {
    pub name: String,
    pub image: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDescriptor {
    #[serde(default)]
    services: Option<Mapping>,
}

/// Services declared across the descriptor files in `dir`, in declaration
/// order. Fails when none of the files exists.
pub async fn load(dir: &Path) -> ComposeResult<Vec<ServiceDef>> {
    let mut services: Vec<ServiceDef> = Vec::new();
    let mut found = false;

    for file in DESCRIPTOR_FILES {
        let path = dir.join(file);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        found = true;
        for def in parse(&text, file)? {
            match services.iter_mut().find(|s| s.name == def.name) {
                Some(existing) => {
                    if def.image.is_some() {
                        existing.image = def.image;
                    }
                }
                None => services.push(def),
            }
        }
    }

    if !found {
        return Err(ComposeError::MissingDescriptor(dir.display().to_string()));
    }
    Ok(services)
}

/// Parse one descriptor document.
pub fn parse(text: &str, file: &str) -> ComposeResult<Vec<ServiceDef>> {
    let raw: Option<RawDescriptor> =
        serde_yaml::from_str(text).map_err(|source| ComposeError::Descriptor {
            file: file.to_string(),
            source,
        })?;

    let services = raw.and_then(|raw| raw.services).unwrap_or_default();
    Ok(services
        .into_iter()
        .filter_map(|(name, body)| {
            let name = name.as_str()?.to_string();
            let image = body
                .get("image")
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(ServiceDef { name, image })
        })
        .collect())
}
