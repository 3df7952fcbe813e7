//! Game description: tick rate, agent roster and arena map.
//!
//! The description is a JSON document, loaded with [`GameDescription::from_file`]
//! or [`GameDescription::from_json`]. Map coordinates are in physical units.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::Vector2;
use std::collections::BTreeMap;
use std::path::Path;

pub const MAZE_VARIANT: &str = "maze";
pub const MAZE_EXIT_TAG: &str = "maze:exit";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentManifest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub language: String,
    #[serde(rename = "gameMode", default)]
    pub game_mode: String,
    #[serde(rename = "RepoURL", default)]
    pub repo_url: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "avatarURL", default)]
    pub avatar_url: String,
}

/// One contestant: who it is and what to run for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub manifest: AgentManifest,
    /// Executable run by the process orchestrator.
    #[serde(default)]
    pub image: String,
}

impl AgentDescriptor {
    /// Builds a descriptor for an executable given on the command line.
    pub fn from_image(image: &str) -> Self {
        let name = Path::new(image)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| image.to_string());

        Self {
            manifest: AgentManifest {
                id: name.clone(),
                name,
                ..AgentManifest::default()
            },
            image: image.to_string(),
        }
    }
}

pub type MapPoint = [f64; 2];

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapPolygon {
    pub points: Vec<MapPoint>,
}

impl MapPolygon {
    pub fn to_vectors(&self) -> Vec<Vector2> {
        self.points.iter().map(|p| Vector2::from(*p)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPointObject {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub point: MapPoint,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPolygonObject {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub polygon: MapPolygon,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl MapPolygonObject {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapMeta {
    #[serde(default)]
    pub readme: String,
    #[serde(default)]
    pub maxcontestants: usize,
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub variant: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapData {
    #[serde(default)]
    pub grounds: Vec<MapPolygonObject>,
    #[serde(default)]
    pub starts: Vec<MapPointObject>,
    #[serde(default)]
    pub obstacles: Vec<MapPolygonObject>,
    #[serde(default)]
    pub otherpoints: Vec<MapPointObject>,
    #[serde(default)]
    pub otherpolygons: Vec<MapPolygonObject>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapContainer {
    #[serde(default)]
    pub meta: MapMeta,
    pub data: MapData,
}

impl MapContainer {
    pub fn is_maze(&self) -> bool {
        self.meta.variant == MAZE_VARIANT
    }

    /// Start points as vectors, in physical units.
    pub fn start_points(&self) -> Vec<Vector2> {
        self.data
            .starts
            .iter()
            .map(|s| Vector2::from(s.point))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameDescription {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub tps: u32,
    #[serde(default)]
    pub agents: Vec<AgentDescriptor>,
    pub map: MapContainer,
}

impl GameDescription {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let description: GameDescription = serde_json::from_str(raw)?;
        description.validate()?;
        Ok(description)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tps == 0 {
            return Err(ConfigError::Invalid("tps must be greater than 0".into()));
        }

        if self.map.data.starts.is_empty() {
            return Err(ConfigError::Invalid(
                "map needs at least one starting point".into(),
            ));
        }

        let polygons = self
            .map
            .data
            .grounds
            .iter()
            .chain(self.map.data.obstacles.iter())
            .chain(self.map.data.otherpolygons.iter());

        for polygon in polygons {
            if polygon.polygon.points.len() < 2 {
                return Err(ConfigError::Invalid(format!(
                    "polygon {} has less than 2 points",
                    polygon.id
                )));
            }
        }

        Ok(())
    }

    ///Returns the number of agents the game waits for before ticking.
    pub fn expected_agents(&self) -> usize {
        self.agents.len()
    }

    /// A walled square arena with a pillar in the middle and four corners to start from.
    pub fn default_arena() -> Self {
        let polygon = |id: &str, half: f64, (cx, cy): (f64, f64)| MapPolygonObject {
            id: id.to_string(),
            name: id.to_string(),
            polygon: MapPolygon {
                points: vec![
                    [cx - half, cy - half],
                    [cx + half, cy - half],
                    [cx + half, cy + half],
                    [cx - half, cy + half],
                    [cx - half, cy - half],
                ],
            },
            tags: Vec::new(),
        };
        let start = |id: &str, point: MapPoint| MapPointObject {
            id: id.to_string(),
            name: id.to_string(),
            point,
            tags: Vec::new(),
        };

        Self {
            id: "default".to_string(),
            name: "Default arena".to_string(),
            tps: shared::DEFAULT_TPS,
            agents: Vec::new(),
            map: MapContainer {
                meta: MapMeta {
                    kind: "deathmatch".to_string(),
                    maxcontestants: 4,
                    ..MapMeta::default()
                },
                data: MapData {
                    grounds: vec![polygon("ground", 0.5, (0.0, 0.0))],
                    starts: vec![
                        start("nw", [-0.4, 0.4]),
                        start("se", [0.4, -0.4]),
                        start("ne", [0.4, 0.4]),
                        start("sw", [-0.4, -0.4]),
                    ],
                    obstacles: vec![polygon("pillar", 0.05, (0.0, 0.0))],
                    ..MapData::default()
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTION: &str = r#"{
        "id": "game-1",
        "name": "Arena",
        "tps": 10,
        "agents": [
            {"manifest": {"id": "seeker", "name": "Seeker", "gameMode": "deathmatch"}, "image": "./seeker"}
        ],
        "map": {
            "meta": {"kind": "deathmatch", "maxcontestants": 4, "readme": ""},
            "data": {
                "grounds": [{"id": "g", "name": "ground", "polygon": {"points": [[-1,-1],[1,-1],[1,1],[-1,1]]}}],
                "starts": [{"id": "s1", "name": "start", "point": [0.1, 0.2]}],
                "obstacles": [],
                "otherpoints": [],
                "otherpolygons": [
                    {"id": "x", "name": "exit", "polygon": {"points": [[0,0],[0.1,0]]}, "tags": ["maze:exit"]}
                ]
            }
        }
    }"#;

    #[test]
    fn test_parse_description() {
        let description = GameDescription::from_json(DESCRIPTION).unwrap();
        assert_eq!(description.tps, 10);
        assert_eq!(description.expected_agents(), 1);
        assert_eq!(description.agents[0].manifest.game_mode, "deathmatch");
        assert_eq!(description.map.start_points(), vec![Vector2::new(0.1, 0.2)]);
        assert!(description.map.data.otherpolygons[0].has_tag(MAZE_EXIT_TAG));
        assert!(!description.map.is_maze());
    }

    #[test]
    fn test_default_arena_is_valid() {
        let description = GameDescription::default_arena();
        assert!(description.validate().is_ok());
        assert_eq!(description.map.start_points().len(), 4);
        assert_eq!(description.tps, shared::DEFAULT_TPS);
    }

    #[test]
    fn test_rejects_zero_tps() {
        let raw = DESCRIPTION.replace("\"tps\": 10", "\"tps\": 0");
        assert!(matches!(
            GameDescription::from_json(&raw),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_degenerate_polygon() {
        let raw = DESCRIPTION.replace("[[0,0],[0.1,0]]", "[[0,0]]");
        assert!(GameDescription::from_json(&raw).is_err());
    }

    #[test]
    fn test_agent_from_image_path() {
        let agent = AgentDescriptor::from_image("/opt/bots/hunter.sh");
        assert_eq!(agent.manifest.id, "hunter");
        assert_eq!(agent.image, "/opt/bots/hunter.sh");
    }
}
