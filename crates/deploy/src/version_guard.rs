//! Advisory warnings for artifacts older than what is deployed.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};
use wds_object_store::{ObjectStore, StoreError, get_optional, list_all, list_top_level_dirs};
use wds_protocol::VersionWarning;

use crate::config::PipelineConfig;
use crate::paths;

struct CachedVersions {
    fetched_at: Instant,
    versions: HashMap<String, Option<String>>,
}

/// Deployed versions per game, valid for a fixed time-to-live.
///
/// Shared between the version guard and the orchestrator, which
/// invalidates it whenever the target store changes.
pub struct VersionCache {
    ttl: Duration,
    inner: Mutex<Option<CachedVersions>>,
}

impl VersionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(None),
        }
    }

    /// Returns the cached version for `game`. `None` means unknown or
    /// expired; `Some(None)` means the game has no deployed version.
    pub fn get(&self, game: &str) -> Option<Option<String>> {
        let inner = self.inner.lock().unwrap();
        let cached = inner.as_ref()?;
        if cached.fetched_at.elapsed() >= self.ttl {
            return None;
        }
        cached.versions.get(game).cloned()
    }

    pub fn insert(&self, game: impl Into<String>, version: Option<String>) {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .as_ref()
            .is_some_and(|cached| cached.fetched_at.elapsed() >= self.ttl)
        {
            *inner = None;
        }
        inner
            .get_or_insert_with(|| CachedVersions {
                fetched_at: Instant::now(),
                versions: HashMap::new(),
            })
            .versions
            .insert(game.into(), version);
    }

    pub fn invalidate(&self) {
        *self.inner.lock().unwrap() = None;
    }
}

/// Name reported for the version file at the root of the target store.
pub const ROOT_GAME: &str = "root";

/// Number of most recent versions kept per game in a version history.
pub const VERSION_HISTORY_DEPTH: usize = 3;

/// A game directory in the target store and its marker version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployedVersion {
    pub game: String,
    pub version: String,
}

/// One artifact version available in the source store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactVersion {
    pub version: String,
    pub artifact_key: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub is_latest: bool,
    pub is_deployed: bool,
}

/// Recent artifact versions of one game next to what is deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameVersionHistory {
    pub name: String,
    pub versions: Vec<ArtifactVersion>,
    pub currently_deployed: Option<String>,
}

/// Compares candidate artifacts with the versions in the target store.
pub struct VersionGuard {
    target: Arc<dyn ObjectStore>,
    cache: Arc<VersionCache>,
    marker: String,
    version_file: String,
}

impl VersionGuard {
    pub fn new(
        target: Arc<dyn ObjectStore>,
        cache: Arc<VersionCache>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            target,
            cache,
            marker: config.marker_token.clone(),
            version_file: config.version_file.clone(),
        }
    }

    /// Reads `{game}/{version_file}` through the cache.
    pub async fn deployed_version(&self, game: &str) -> Result<Option<String>, StoreError> {
        if let Some(version) = self.cache.get(game) {
            return Ok(version);
        }

        let key = format!("{game}/{}", self.version_file);
        let version = get_optional(&*self.target, &key).await?.and_then(|bytes| {
            let text = String::from_utf8_lossy(&bytes).trim().to_string();
            (!text.is_empty()).then_some(text)
        });
        debug!(game, version = ?version, "read deployed version");
        self.cache.insert(game, version.clone());
        Ok(version)
    }

    /// Returns one warning per artifact whose version is lower than the
    /// deployed version of its game.
    ///
    /// Keys without a parseable version are skipped. A game whose marker
    /// cannot be read yields no warning.
    pub async fn check_versions(&self, keys: &[String]) -> Vec<VersionWarning> {
        let mut warnings = Vec::new();
        let mut deployed: HashMap<String, Option<String>> = HashMap::new();
        let mut seen = HashSet::new();

        for key in keys {
            if !seen.insert(key.as_str()) {
                continue;
            }
            let Some(version) = paths::resolve_version(key, &self.marker) else {
                continue;
            };
            let game = paths::resolve_game_name(key, &self.marker);

            let current = match deployed.get(&game) {
                Some(current) => current.clone(),
                None => {
                    let current = match self.deployed_version(&game).await {
                        Ok(current) => current,
                        Err(e) => {
                            warn!(game = %game, error = %e, "failed to read deployed version");
                            None
                        }
                    };
                    deployed.insert(game.clone(), current.clone());
                    current
                }
            };

            if let Some(current) = current
                && paths::compare_versions(&version, &current).is_lt()
            {
                warnings.push(VersionWarning {
                    game_name: game,
                    artifact_key: key.clone(),
                    artifact_version: version,
                    deployed_version: current,
                });
            }
        }

        warnings
    }

    /// Lists the top-level directories of the target that carry a
    /// version file, plus the root version file as [`ROOT_GAME`].
    ///
    /// Directories without a version are skipped, as are markers that
    /// cannot be read. Sorted by game.
    pub async fn deployed_versions(&self) -> Result<Vec<DeployedVersion>, StoreError> {
        let mut versions = Vec::new();
        for game in list_top_level_dirs(&*self.target).await? {
            match self.deployed_version(&game).await {
                Ok(Some(version)) => versions.push(DeployedVersion { game, version }),
                Ok(None) => {}
                Err(e) => warn!(game = %game, error = %e, "failed to read deployed version"),
            }
        }

        match get_optional(&*self.target, &self.version_file).await {
            Ok(Some(bytes)) => {
                let version = String::from_utf8_lossy(&bytes).trim().to_string();
                if !version.is_empty() {
                    versions.push(DeployedVersion {
                        game: ROOT_GAME.to_string(),
                        version,
                    });
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to read root version"),
        }

        versions.sort_by(|a, b| a.game.cmp(&b.game));
        Ok(versions)
    }

    /// Groups the versioned archives of `source` by game and keeps the
    /// most recent [`VERSION_HISTORY_DEPTH`] of each, flagging the latest
    /// one and the one currently deployed in the target.
    pub async fn version_history(
        &self,
        source: &dyn ObjectStore,
    ) -> Result<Vec<GameVersionHistory>, StoreError> {
        let mut games: BTreeMap<String, Vec<ArtifactVersion>> = BTreeMap::new();
        for object in list_all(source, "").await? {
            if !paths::is_archive(&object.key) {
                continue;
            }
            let Some(version) = paths::resolve_version(&object.key, &self.marker) else {
                continue;
            };
            let game = paths::resolve_game_name(&object.key, &self.marker);
            games.entry(game).or_default().push(ArtifactVersion {
                version,
                artifact_key: object.key,
                last_modified: object.last_modified,
                is_latest: false,
                is_deployed: false,
            });
        }

        let deployed: HashMap<String, String> = self
            .deployed_versions()
            .await?
            .into_iter()
            .map(|d| (d.game, d.version))
            .collect();

        let mut history = Vec::with_capacity(games.len());
        for (name, mut versions) in games {
            paths::sort_versions(&mut versions, |v| Some(v.version.as_str()));
            let skip = versions.len().saturating_sub(VERSION_HISTORY_DEPTH);
            let mut versions = versions.split_off(skip);
            let current = deployed.get(&name).cloned();
            for v in &mut versions {
                v.is_deployed = current.as_deref() == Some(v.version.as_str());
            }
            if let Some(last) = versions.last_mut() {
                last.is_latest = true;
            }
            history.push(GameVersionHistory {
                name,
                versions,
                currently_deployed: current,
            });
        }

        debug!(games = history.len(), "built version history");
        Ok(history)
    }
}
