//! Condition data model: filter kinds, the condition record, its fixed-layout
//! hex encoding and the version migration chain.

use crate::error::{ConditionError, ConfigError};
use crate::oracle::{biome, LegacyLayer, QuadTier, StructureType};
use crate::types::{Dimension, McVersion, MAX_CONDITIONS};

// ---------------------------------------------------------------------------
// Filter kinds
// ---------------------------------------------------------------------------

/// Predicate kind of a condition. Discriminants are persisted.
///
/// Kinds marked *retired* only occur in payloads saved before 4.0.0; the
/// migration chain folds them into [`FilterKind::Spiral`],
/// [`FilterKind::Biome`], [`FilterKind::BiomeNether`] and
/// [`FilterKind::BiomeEnd`] plus a `step`.
#[derive(Debug, Clone, Copy, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[repr(u16)]
pub enum FilterKind {
    /// Root / selection placeholder.
    #[default]
    None = 0,
    QhIdeal = 1,
    QhClassic = 2,
    QhNormal = 3,
    QhBarely = 4,
    Qm95 = 5,
    Qm90 = 6,
    Biome = 7,
    /// retired
    Biome4 = 8,
    /// retired
    Biome16 = 9,
    /// retired
    Biome64 = 10,
    /// retired
    Biome256 = 11,
    Biome4River = 12,
    Biome256Otemp = 13,
    Temps = 14,
    Slime = 15,
    Spawn = 16,
    Stronghold = 17,
    Desert = 18,
    Jungle = 19,
    Hut = 20,
    Igloo = 21,
    Monument = 22,
    Village = 23,
    Outpost = 24,
    Mansion = 25,
    Treasure = 26,
    Ruins = 27,
    Shipwreck = 28,
    Portal = 29,
    Fortress = 30,
    Bastion = 31,
    EndCity = 32,
    BiomeNether = 33,
    /// retired
    BiomeNether4 = 34,
    /// retired
    BiomeNether16 = 35,
    /// retired
    BiomeNether64 = 36,
    /// retired
    BiomeNether256 = 37,
    BiomeEnd = 38,
    /// retired
    BiomeEnd4 = 39,
    /// retired
    BiomeEnd16 = 40,
    /// retired
    BiomeEnd64 = 41,
    Gateway = 42,
    Mineshaft = 43,
    Spiral = 44,
    /// retired
    Spiral4 = 45,
    /// retired
    Spiral16 = 46,
    /// retired
    Spiral64 = 47,
    /// retired
    Spiral256 = 48,
    /// retired
    Spiral512 = 49,
    /// retired
    Spiral1024 = 50,
    BiomeCenter = 51,
    BiomeCenter256 = 52,
    ClimateNoise = 53,
    AncientCity = 54,
    LogicOr = 55,
    PortalNether = 56,
    ClimateMinMax = 57,
    ScaleToNether = 58,
    ScaleToOverworld = 59,
    LogicNot = 60,
    FirstStronghold = 61,
    Script = 62,
    Well = 63,
    Trails = 64,
    BiomeSample = 65,
    NoiseSample = 66,
    Height = 67,
}

impl FilterKind {
    pub const COUNT: u16 = 68;

    const ALL: [FilterKind; 68] = [
        FilterKind::None,
        FilterKind::QhIdeal,
        FilterKind::QhClassic,
        FilterKind::QhNormal,
        FilterKind::QhBarely,
        FilterKind::Qm95,
        FilterKind::Qm90,
        FilterKind::Biome,
        FilterKind::Biome4,
        FilterKind::Biome16,
        FilterKind::Biome64,
        FilterKind::Biome256,
        FilterKind::Biome4River,
        FilterKind::Biome256Otemp,
        FilterKind::Temps,
        FilterKind::Slime,
        FilterKind::Spawn,
        FilterKind::Stronghold,
        FilterKind::Desert,
        FilterKind::Jungle,
        FilterKind::Hut,
        FilterKind::Igloo,
        FilterKind::Monument,
        FilterKind::Village,
        FilterKind::Outpost,
        FilterKind::Mansion,
        FilterKind::Treasure,
        FilterKind::Ruins,
        FilterKind::Shipwreck,
        FilterKind::Portal,
        FilterKind::Fortress,
        FilterKind::Bastion,
        FilterKind::EndCity,
        FilterKind::BiomeNether,
        FilterKind::BiomeNether4,
        FilterKind::BiomeNether16,
        FilterKind::BiomeNether64,
        FilterKind::BiomeNether256,
        FilterKind::BiomeEnd,
        FilterKind::BiomeEnd4,
        FilterKind::BiomeEnd16,
        FilterKind::BiomeEnd64,
        FilterKind::Gateway,
        FilterKind::Mineshaft,
        FilterKind::Spiral,
        FilterKind::Spiral4,
        FilterKind::Spiral16,
        FilterKind::Spiral64,
        FilterKind::Spiral256,
        FilterKind::Spiral512,
        FilterKind::Spiral1024,
        FilterKind::BiomeCenter,
        FilterKind::BiomeCenter256,
        FilterKind::ClimateNoise,
        FilterKind::AncientCity,
        FilterKind::LogicOr,
        FilterKind::PortalNether,
        FilterKind::ClimateMinMax,
        FilterKind::ScaleToNether,
        FilterKind::ScaleToOverworld,
        FilterKind::LogicNot,
        FilterKind::FirstStronghold,
        FilterKind::Script,
        FilterKind::Well,
        FilterKind::Trails,
        FilterKind::BiomeSample,
        FilterKind::NoiseSample,
        FilterKind::Height,
    ];

    pub fn from_u16(v: u16) -> Option<FilterKind> {
        Self::ALL.get(v as usize).copied()
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Static description of this kind.
    pub fn info(self) -> FilterInfo {
        use Branch::{Cluster, Split};
        use Dimension::{End, Nether, Overworld};
        use FilterKind as K;
        use StructureType as S;

        let base = FilterInfo {
            name: "",
            family: Family::Retired,
            branch: Branch::None,
            structure: None,
            dim: Overworld,
            dep64: false,
            grid: 1,
            loc: LOC_1 | LOC_2 | LOC_R,
        };
        let structure = |name, st: StructureType| FilterInfo {
            name,
            family: Family::Structure,
            branch: Cluster,
            structure: Some(st),
            dim: st.dimension(),
            dep64: st.dimension() == Overworld,
            ..base
        };

        match self {
            K::None => FilterInfo { name: "Conditions", family: Family::Root, loc: 0, ..base },
            K::QhIdeal => FilterInfo {
                name: "Quad-hut (ideal)",
                family: Family::QuadHut(QuadTier::Ideal),
                branch: Split,
                structure: Some(S::SwampHut),
                grid: 512,
                ..base
            },
            K::QhClassic => FilterInfo {
                name: "Quad-hut (classic)",
                family: Family::QuadHut(QuadTier::Classic),
                branch: Split,
                structure: Some(S::SwampHut),
                grid: 512,
                ..base
            },
            K::QhNormal => FilterInfo {
                name: "Quad-hut (normal)",
                family: Family::QuadHut(QuadTier::Normal),
                branch: Split,
                structure: Some(S::SwampHut),
                grid: 512,
                ..base
            },
            K::QhBarely => FilterInfo {
                name: "Quad-hut (barely)",
                family: Family::QuadHut(QuadTier::Barely),
                branch: Split,
                structure: Some(S::SwampHut),
                grid: 512,
                ..base
            },
            K::Qm95 => FilterInfo {
                name: "Quad-ocean-monument (>95%)",
                family: Family::QuadMonument(95),
                branch: Split,
                structure: Some(S::Monument),
                grid: 512,
                ..base
            },
            K::Qm90 => FilterInfo {
                name: "Quad-ocean-monument (>90%)",
                family: Family::QuadMonument(90),
                branch: Split,
                structure: Some(S::Monument),
                grid: 512,
                ..base
            },
            K::Biome => FilterInfo { name: "Biomes", family: Family::Biome, dep64: true, ..base },
            K::BiomeNether => FilterInfo {
                name: "Nether biomes",
                family: Family::Biome,
                dim: Nether,
                ..base
            },
            K::BiomeEnd => FilterInfo {
                name: "End biomes",
                family: Family::Biome,
                dim: End,
                ..base
            },
            K::Biome4 | K::Biome16 | K::Biome64 | K::Biome256 => {
                FilterInfo { name: "Biomes (legacy)", ..base }
            }
            K::BiomeNether4 | K::BiomeNether16 | K::BiomeNether64 | K::BiomeNether256 => {
                FilterInfo { name: "Nether biomes (legacy)", dim: Nether, ..base }
            }
            K::BiomeEnd4 | K::BiomeEnd16 | K::BiomeEnd64 => {
                FilterInfo { name: "End biomes (legacy)", dim: End, ..base }
            }
            K::Biome4River => FilterInfo {
                name: "Biomes 1:4 river",
                family: Family::Layer(LegacyLayer::River4),
                dep64: true,
                grid: 4,
                ..base
            },
            K::Biome256Otemp => FilterInfo {
                name: "Biomes 1:256 ocean type",
                family: Family::Layer(LegacyLayer::OceanTemp256),
                grid: 256,
                ..base
            },
            K::Temps => FilterInfo {
                name: "Temperature categories",
                family: Family::Temps,
                dep64: true,
                grid: 1024,
                ..base
            },
            K::Slime => FilterInfo {
                name: "Slime chunk",
                family: Family::Slime,
                branch: Cluster,
                grid: 16,
                ..base
            },
            K::Spawn => FilterInfo { name: "Spawn", family: Family::Spawn, dep64: true, ..base },
            K::Stronghold => FilterInfo {
                name: "Stronghold",
                family: Family::Stronghold,
                branch: Cluster,
                dep64: true,
                ..base
            },
            K::FirstStronghold => FilterInfo {
                name: "First stronghold",
                family: Family::FirstStronghold,
                ..base
            },
            K::Desert => structure("Desert pyramid", S::DesertPyramid),
            K::Jungle => structure("Jungle temple", S::JunglePyramid),
            K::Hut => structure("Swamp hut", S::SwampHut),
            K::Igloo => structure("Igloo", S::Igloo),
            K::Monument => structure("Ocean monument", S::Monument),
            K::Village => structure("Village", S::Village),
            K::Outpost => structure("Pillager outpost", S::Outpost),
            K::Mansion => structure("Woodland mansion", S::Mansion),
            K::Treasure => structure("Buried treasure", S::Treasure),
            K::Ruins => structure("Ocean ruins", S::OceanRuin),
            K::Shipwreck => structure("Shipwreck", S::Shipwreck),
            K::Portal => structure("Ruined portal", S::RuinedPortal),
            K::PortalNether => structure("Ruined portal (nether)", S::RuinedPortalNether),
            K::AncientCity => structure("Ancient city", S::AncientCity),
            K::Well => structure("Desert well", S::DesertWell),
            K::Trails => structure("Trail ruins", S::TrailRuins),
            K::Fortress => structure("Nether fortress", S::Fortress),
            K::Bastion => structure("Bastion remnant", S::Bastion),
            K::EndCity => structure("End city", S::EndCity),
            K::Gateway => structure("End gateway", S::EndGateway),
            K::Mineshaft => FilterInfo {
                name: "Abandoned mineshaft",
                family: Family::Mineshaft,
                branch: Cluster,
                structure: Some(S::Mineshaft),
                grid: 16,
                ..base
            },
            K::Spiral => FilterInfo { name: "Spiral iterator", family: Family::Spiral, ..base },
            K::Spiral4
            | K::Spiral16
            | K::Spiral64
            | K::Spiral256
            | K::Spiral512
            | K::Spiral1024 => FilterInfo { name: "Spiral iterator (legacy)", ..base },
            K::BiomeCenter => FilterInfo {
                name: "Locate biome center 1:4",
                family: Family::BiomeCenter,
                branch: Cluster,
                dep64: true,
                grid: 4,
                ..base
            },
            K::BiomeCenter256 => FilterInfo {
                name: "Locate biome center 1:256",
                family: Family::BiomeCenter,
                branch: Cluster,
                dep64: true,
                grid: 256,
                ..base
            },
            K::ClimateNoise => FilterInfo {
                name: "Climate parameters 1:4",
                family: Family::ClimateNoise,
                dep64: true,
                grid: 4,
                ..base
            },
            K::ClimateMinMax => FilterInfo {
                name: "Locate climate extreme 1:4",
                family: Family::ClimateMinMax,
                dep64: true,
                grid: 4,
                ..base
            },
            K::LogicOr => FilterInfo { name: "OR logic gate", family: Family::Or, loc: 0, ..base },
            K::LogicNot => FilterInfo { name: "NOT logic gate", family: Family::Not, loc: 0, ..base },
            K::ScaleToNether => FilterInfo {
                name: "Coordinate factor x/8",
                family: Family::ScaleToNether,
                loc: 0,
                ..base
            },
            K::ScaleToOverworld => FilterInfo {
                name: "Coordinate factor x*8",
                family: Family::ScaleToOverworld,
                loc: 0,
                ..base
            },
            K::Script => FilterInfo { name: "Script", family: Family::Script, loc: 0, ..base },
            K::BiomeSample => FilterInfo {
                name: "Biome samples",
                family: Family::Sample,
                branch: Cluster,
                dep64: true,
                grid: 4,
                ..base
            },
            K::NoiseSample => FilterInfo {
                name: "Climate noise samples",
                family: Family::Sample,
                branch: Cluster,
                dep64: true,
                grid: 4,
                ..base
            },
            K::Height => FilterInfo {
                name: "Surface height",
                family: Family::Height,
                dep64: true,
                grid: 4,
                loc: LOC_1,
                ..base
            },
        }
    }

    /// `(current kind, step)` a retired kind migrates to.
    fn migrated(self) -> Option<(FilterKind, i32)> {
        use FilterKind as K;
        let m = match self {
            K::Spiral => (K::Spiral, 1),
            K::Spiral4 => (K::Spiral, 4),
            K::Spiral16 => (K::Spiral, 16),
            K::Spiral64 => (K::Spiral, 64),
            K::Spiral256 => (K::Spiral, 256),
            K::Spiral512 => (K::Spiral, 512),
            K::Spiral1024 => (K::Spiral, 1024),
            K::Biome => (K::Biome, 1),
            K::Biome4 => (K::Biome, 4),
            K::Biome16 => (K::Biome, 16),
            K::Biome64 => (K::Biome, 64),
            K::Biome256 => (K::Biome, 256),
            K::BiomeNether => (K::BiomeNether, 1),
            K::BiomeNether4 => (K::BiomeNether, 4),
            K::BiomeNether16 => (K::BiomeNether, 16),
            K::BiomeNether64 => (K::BiomeNether, 64),
            K::BiomeNether256 => (K::BiomeNether, 256),
            K::BiomeEnd => (K::BiomeEnd, 1),
            K::BiomeEnd4 => (K::BiomeEnd, 4),
            K::BiomeEnd16 => (K::BiomeEnd, 16),
            K::BiomeEnd64 => (K::BiomeEnd, 64),
            _ => return None,
        };
        Some(m)
    }
}

/// How a node with children treats the instances of its own predicate.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Branch {
    /// Single (averaged) position only.
    None,
    /// Always splits into one sub-branch per instance.
    Split,
    /// Splits when `count == 1`, averages otherwise.
    Cluster,
}

/// Evaluation family; one handler per family.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Family {
    Root,
    Spiral,
    ScaleToNether,
    ScaleToOverworld,
    Or,
    Not,
    Script,
    QuadHut(QuadTier),
    /// Minimum quality percentage.
    QuadMonument(i32),
    Structure,
    Mineshaft,
    Spawn,
    FirstStronghold,
    Stronghold,
    Slime,
    Sample,
    Layer(LegacyLayer),
    Temps,
    Biome,
    BiomeCenter,
    ClimateMinMax,
    ClimateNoise,
    Height,
    /// Pre-4.0.0 kinds; rejected at tree build.
    Retired,
}

/// Uses the first corner.
pub const LOC_1: u8 = 0x01;
/// Uses the second corner.
pub const LOC_2: u8 = 0x02;
/// Accepts a radius instead of a rectangle.
pub const LOC_R: u8 = 0x04;

#[derive(Debug, Clone, Copy)]
pub struct FilterInfo {
    pub name: &'static str,
    pub family: Family,
    pub branch: Branch,
    pub structure: Option<StructureType>,
    pub dim: Dimension,
    /// Exact checks need the full 64-bit seed.
    pub dep64: bool,
    /// Coordinate unit before 4.0.0.
    pub grid: i32,
    pub loc: u8,
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// Save-format versions.
pub mod version {
    pub const LEGACY: u8 = 0;
    pub const V2_3_0: u8 = 1;
    pub const V2_4_0: u8 = 2;
    pub const V3_4_0: u8 = 3;
    pub const V4_0_0: u8 = 4;
    pub const CURRENT: u8 = V4_0_0;
}

/// Condition is excluded from the tree.
pub const META_DISABLED: u16 = 0x0001;

pub const FLG_APPROX: u32 = 0x0001;
pub const FLG_MATCH_ANY: u32 = 0x0002;
pub const FLG_INVERT: u32 = 0x0004;
pub const FLG_IN_RANGE: u32 = 0x0008;

pub const E_LOCATE_MIN: u8 = 0x01;
pub const E_LOCATE_MAX: u8 = 0x02;
pub const E_TEST_LOWER: u8 = 0x04;
pub const E_TEST_UPPER: u8 = 0x08;

pub const VAR_WITH_START: u16 = 0x0001;
pub const VAR_ABANDONED: u16 = 0x0002;
pub const VAR_ENDSHIP: u16 = 0x0004;
pub const VAR_DENSE_BB: u16 = 0x0008;
pub const VAR_NOT: u16 = 0x0010;
pub const VAR_BASEMENT: u16 = 0x0020;

/// Number of temperature categories tracked by `temps`.
pub const TEMP_CATEGORIES: usize = 9;

/// Persisted bytes: everything up to the generated biome filter.
pub const SAVE_SIZE: usize = 324;
/// Smallest payload accepted by [`Condition::from_hex`]: the offset of `count`.
pub const MIN_PREFIX: usize = 164;

/// One predicate node of a condition tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub kind: FilterKind,
    pub meta: u16,
    pub x1: i32,
    pub z1: i32,
    pub x2: i32,
    pub z2: i32,
    /// Stable id, also the index into the tree.
    pub save: i32,
    /// Id of the parent, 0 for the root.
    pub relative: i32,
    /// Ignore an instance sitting exactly at the origin.
    pub skipref: bool,
    /// User label, NUL padded.
    pub text: [u8; 28],
    pub hash: u64,
    /// Condition ids a script reads, 0 terminated.
    pub deps: [u8; 16],
    pub biome_to_find: u64,
    pub biome_to_find_m: u64,
    pub biome_to_excl: u64,
    pub biome_to_excl_m: u64,
    pub biome_id: i32,
    pub biome_size: i32,
    pub temps: [i32; TEMP_CATEGORIES],
    /// 0 = exclusion filter, 1 = single, >1 = cluster.
    pub count: i32,
    pub y: i32,
    pub flags: u32,
    /// Radius + 1; 0 selects the rectangle.
    pub rmax: i32,
    pub version: u8,
    pub tol: u8,
    pub minmax: u8,
    pub para: u8,
    pub octave: u8,
    pub varflags: u16,
    pub varbiome: i32,
    pub varstart: u64,
    pub limok: [[i32; 2]; 6],
    pub limex: [[i32; 2]; 6],
    pub vmin: f64,
    pub vmax: f64,
    pub confidence: f32,
    pub coverage: f32,
    pub step: i32,

    // generated by `apply`, never persisted
    pub filter: BiomeFilter,
}

impl Default for Condition {
    fn default() -> Self {
        Self {
            kind: FilterKind::None,
            meta: 0,
            x1: 0,
            z1: 0,
            x2: 0,
            z2: 0,
            save: 0,
            relative: 0,
            skipref: false,
            text: [0; 28],
            hash: 0,
            deps: [0; 16],
            biome_to_find: 0,
            biome_to_find_m: 0,
            biome_to_excl: 0,
            biome_to_excl_m: 0,
            biome_id: 0,
            biome_size: 0,
            temps: [0; TEMP_CATEGORIES],
            count: 0,
            y: 0,
            flags: 0,
            rmax: 0,
            version: version::LEGACY,
            tol: 0,
            minmax: 0,
            para: 0,
            octave: 0,
            varflags: 0,
            varbiome: 0,
            varstart: 0,
            limok: [[0; 2]; 6],
            limex: [[0; 2]; 6],
            vmin: 0.0,
            vmax: 0.0,
            confidence: 0.0,
            coverage: 0.0,
            step: 0,
            filter: BiomeFilter::default(),
        }
    }
}

impl Condition {
    /// A current-version condition of `kind` with id `save` under `relative`.
    pub fn new(kind: FilterKind, save: i32, relative: i32) -> Self {
        Self {
            kind,
            save,
            relative,
            count: 1,
            version: version::CURRENT,
            limok: [[i32::MIN, i32::MAX]; 6],
            limex: [[i32::MIN, i32::MAX]; 6],
            ..Default::default()
        }
    }

    /// Builder: relative rectangle.
    pub fn with_rect(mut self, x1: i32, z1: i32, x2: i32, z2: i32) -> Self {
        self.x1 = x1;
        self.z1 = z1;
        self.x2 = x2;
        self.z2 = z2;
        self.rmax = 0;
        self
    }

    /// Builder: search radius (stored as `r + 1`).
    pub fn with_radius(mut self, r: i32) -> Self {
        self.rmax = r.saturating_add(1);
        self
    }

    pub fn with_count(mut self, count: i32) -> Self {
        self.count = count;
        self
    }

    pub fn info(&self) -> FilterInfo {
        self.kind.info()
    }

    pub fn is_disabled(&self) -> bool {
        self.meta & META_DISABLED != 0
    }

    pub fn label(&self) -> Option<String> {
        let len = self.text.iter().position(|&b| b == 0).unwrap_or(self.text.len());
        if len == 0 {
            return None;
        }
        Some(String::from_utf8_lossy(&self.text[..len]).into_owned())
    }

    pub fn set_label(&mut self, label: &str) {
        self.text = [0; 28];
        let bytes = label.as_bytes();
        let n = bytes.len().min(self.text.len() - 1);
        self.text[..n].copy_from_slice(&bytes[..n]);
    }

    /// One-line description, e.g. `[03] Village x2 [01]+ r<255`.
    pub fn summary(&self) -> String {
        let info = self.info();
        let mut s = if self.is_disabled() {
            format!("#{:02}#", self.save)
        } else {
            format!("[{:02}]", self.save)
        };
        if self.kind == FilterKind::None {
            s.push(' ');
            s.push_str(info.name);
            return s;
        }

        let mut counts = String::new();
        if info.branch == Branch::Cluster {
            counts.push_str(&format!("x{}", self.count));
        }
        if self.skipref {
            counts.push('*');
        }

        let name = match self.label() {
            Some(label) => label,
            None if self.kind == FilterKind::Script => format!("{}: {:016x}", info.name, self.hash),
            None if self.step > 0 => format!("{} 1:{}", info.name, self.step),
            None => info.name.to_string(),
        };
        s.push_str(&format!(" {:<26}{:<4}", name, counts));

        if self.relative != 0 {
            s.push_str(&format!("[{:02}]+", self.relative));
        } else {
            s.push_str("     ");
        }
        if self.rmax > 0 {
            s.push_str(&format!("r<{}", self.rmax - 1));
        } else {
            if info.loc & LOC_1 != 0 {
                s.push_str(&format!("({},{})", self.x1, self.z1));
            }
            if info.loc & LOC_2 != 0 {
                s.push_str(&format!(",({},{})", self.x2, self.z2));
            }
        }
        s
    }

    // -----------------------------------------------------------------------
    // Validation / generated state
    // -----------------------------------------------------------------------

    /// Validate the parameters for `mc` and build the biome filter.
    pub fn apply(&mut self, mc: McVersion) -> Result<(), ConfigError> {
        let info = self.info();
        if info.family == Family::Retired {
            return Err(ConfigError::RetiredKind {
                save: self.save,
                name: info.name,
            });
        }

        let include = BiomeSet::from_masks(self.biome_to_find, self.biome_to_find_m);
        let exclude = BiomeSet::from_masks(self.biome_to_excl, self.biome_to_excl_m);
        if let Some(id) = include.intersection(&exclude).first() {
            return Err(ConfigError::BiomeFilter {
                save: self.save,
                reason: format!("biome {} is both required and excluded", id),
            });
        }
        if mc <= McVersion::V1_17 && include.iter().any(|id| id >= 174 && id < 192) {
            log::debug!(
                "condition {}: filter references biomes unknown to {}",
                self.save,
                mc
            );
        }

        self.filter = BiomeFilter {
            include,
            exclude,
            match_any: self.flags & FLG_MATCH_ANY != 0,
            approx: self.flags & FLG_APPROX != 0,
        };
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Hex encoding
    // -----------------------------------------------------------------------

    /// Fixed-layout little-endian bytes of every persisted field.
    pub fn to_bytes(&self) -> [u8; SAVE_SIZE] {
        let mut buf = [0u8; SAVE_SIZE];
        let mut w = ByteWriter::new(&mut buf);
        w.u16(self.kind.as_u16());
        w.u16(self.meta);
        w.i32(self.x1);
        w.i32(self.z1);
        w.i32(self.x2);
        w.i32(self.z2);
        w.i32(self.save);
        w.i32(self.relative);
        w.u8(self.skipref as u8);
        w.skip(3);
        w.bytes(&self.text);
        w.skip(4);
        w.u64(self.hash);
        w.bytes(&self.deps);
        w.u64(self.biome_to_find);
        w.u64(self.biome_to_find_m);
        w.u64(self.biome_to_excl);
        w.u64(self.biome_to_excl_m);
        w.i32(self.biome_id);
        w.i32(self.biome_size);
        for t in self.temps {
            w.i32(t);
        }
        debug_assert_eq!(w.at, MIN_PREFIX);
        w.i32(self.count);
        w.i32(self.y);
        w.u32(self.flags);
        w.i32(self.rmax);
        w.u8(self.version);
        w.u8(self.tol);
        w.u8(self.minmax);
        w.u8(self.para);
        w.u8(self.octave);
        w.skip(1);
        w.u16(self.varflags);
        w.i32(self.varbiome);
        w.u64(self.varstart);
        for lim in self.limok.iter().chain(self.limex.iter()) {
            w.i32(lim[0]);
            w.i32(lim[1]);
        }
        w.u64(self.vmin.to_bits());
        w.u64(self.vmax.to_bits());
        w.u32(self.confidence.to_bits());
        w.u32(self.coverage.to_bits());
        w.i32(self.step);
        debug_assert_eq!(w.at, SAVE_SIZE);
        buf
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.to_bytes())
    }

    /// Decode a hex payload of any historical version.
    ///
    /// Payloads shorter than [`MIN_PREFIX`] bytes are rejected; missing
    /// trailing fields are zero-filled and then migrated to the current
    /// version.
    pub fn from_hex(hex: &str) -> Result<Condition, ConditionError> {
        let hex = hex.trim();
        if hex.len() / 2 < MIN_PREFIX {
            return Err(ConditionError::Truncated {
                got: hex.len() / 2,
                need: MIN_PREFIX,
            });
        }
        let raw = hex::decode(hex)?;

        let mut buf = [0u8; SAVE_SIZE];
        let n = raw.len().min(SAVE_SIZE);
        buf[..n].copy_from_slice(&raw[..n]);

        let mut r = ByteReader::new(&buf);
        let kind_raw = r.u16();
        let meta = r.u16();
        let (x1, z1, x2, z2) = (r.i32(), r.i32(), r.i32(), r.i32());
        let save = r.i32();
        let relative = r.i32();

        if !(0..MAX_CONDITIONS as i32).contains(&save) {
            return Err(ConditionError::SaveOutOfRange(save));
        }
        let kind = FilterKind::from_u16(kind_raw).ok_or(ConditionError::UnknownKind(kind_raw))?;

        let mut c = Condition {
            kind,
            meta,
            x1,
            z1,
            x2,
            z2,
            save,
            relative,
            ..Default::default()
        };
        c.skipref = r.u8() != 0;
        r.skip(3);
        c.text.copy_from_slice(r.bytes(28));
        r.skip(4);
        c.hash = r.u64();
        c.deps.copy_from_slice(r.bytes(16));
        c.biome_to_find = r.u64();
        c.biome_to_find_m = r.u64();
        c.biome_to_excl = r.u64();
        c.biome_to_excl_m = r.u64();
        c.biome_id = r.i32();
        c.biome_size = r.i32();
        for t in c.temps.iter_mut() {
            *t = r.i32();
        }
        c.count = r.i32();
        c.y = r.i32();
        c.flags = r.u32();
        c.rmax = r.i32();
        c.version = r.u8();
        c.tol = r.u8();
        c.minmax = r.u8();
        c.para = r.u8();
        c.octave = r.u8();
        r.skip(1);
        c.varflags = r.u16();
        c.varbiome = r.i32();
        c.varstart = r.u64();
        for lim in c.limok.iter_mut() {
            *lim = [r.i32(), r.i32()];
        }
        for lim in c.limex.iter_mut() {
            *lim = [r.i32(), r.i32()];
        }
        c.vmin = f64::from_bits(r.u64());
        c.vmax = f64::from_bits(r.u64());
        c.confidence = f32::from_bits(r.u32());
        c.coverage = f32::from_bits(r.u32());
        c.step = r.i32();

        c.upgrade();
        Ok(c)
    }

    // -----------------------------------------------------------------------
    // Migration
    // -----------------------------------------------------------------------

    /// Bring the fields up to [`version::CURRENT`].
    ///
    /// Each step is gated on the stored version and the chain ends by
    /// stamping the current version, so running it again is a no-op.
    pub fn upgrade(&mut self) {
        if self.version == version::LEGACY {
            // legacy payloads kept a 64-bit ocean mask where biome_id/biome_size live now
            let ocean_to_find = (self.biome_id as u32 as u64) | ((self.biome_size as u32 as u64) << 32);
            self.biome_to_find &= !((1u64 << biome::OCEAN) | (1u64 << biome::DEEP_OCEAN));
            self.biome_to_find |= ocean_to_find;
            self.skipref = false;
            self.text = [0; 28];
            self.hash = 0;
            self.deps = [0; 16];
            self.biome_id = 0;
            self.biome_size = 0;
            self.tol = 0;
            self.minmax = 0;
            self.para = 0;
            self.octave = 0;
            self.step = 0;
        }
        if self.version < version::V2_4_0 {
            self.varflags = 0;
            self.varbiome = 0;
            self.varstart = 0;
        }
        if self.version < version::V3_4_0 && self.kind == FilterKind::ClimateMinMax {
            match self.minmax {
                // min(<=) -> min <= x
                0 => {
                    self.minmax = E_LOCATE_MIN | E_TEST_UPPER;
                    std::mem::swap(&mut self.vmin, &mut self.vmax);
                }
                // max(>=) -> x <= max
                1 => self.minmax = E_LOCATE_MAX | E_TEST_LOWER,
                // min(>=) -> x <= min
                2 => self.minmax = E_LOCATE_MIN | E_TEST_LOWER,
                // max(<=) -> max <= x
                3 => {
                    self.minmax = E_LOCATE_MAX | E_TEST_UPPER;
                    std::mem::swap(&mut self.vmin, &mut self.vmax);
                }
                _ => {}
            }
        }
        if self.version < version::V4_0_0 {
            let grid = self.info().grid;
            if let Some((kind, step)) = self.kind.migrated() {
                self.kind = kind;
                self.step = step;
            }
            let mult = if self.step != 0 { self.step } else { grid };
            if mult > 1 {
                self.x1 = self.x1.saturating_mul(mult);
                self.z1 = self.z1.saturating_mul(mult);
                self.x2 = self.x2.saturating_add(1).saturating_mul(mult).saturating_sub(1);
                self.z2 = self.z2.saturating_add(1).saturating_mul(mult).saturating_sub(1);
            }
        }
        self.version = version::CURRENT;
    }
}

// ---------------------------------------------------------------------------
// Biome filter
// ---------------------------------------------------------------------------

/// Set of biome ids `0..256`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BiomeSet([u64; 4]);

impl BiomeSet {
    /// Bits of `normal` are ids 0..64, bits of `extended` are ids 128..192.
    pub fn from_masks(normal: u64, extended: u64) -> Self {
        BiomeSet([normal, 0, extended, 0])
    }

    pub fn contains(&self, id: i32) -> bool {
        (0..256).contains(&id) && self.0[(id >> 6) as usize] & (1u64 << (id & 63)) != 0
    }

    pub fn insert(&mut self, id: i32) {
        if (0..256).contains(&id) {
            self.0[(id >> 6) as usize] |= 1u64 << (id & 63);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }

    pub fn len(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn intersection(&self, other: &BiomeSet) -> BiomeSet {
        let mut out = [0u64; 4];
        for (i, w) in out.iter_mut().enumerate() {
            *w = self.0[i] & other.0[i];
        }
        BiomeSet(out)
    }

    pub fn is_superset(&self, other: &BiomeSet) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a & b == *b)
    }

    pub fn first(&self) -> Option<i32> {
        self.iter().next()
    }

    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        (0..256).filter(move |id| self.contains(*id))
    }
}

/// Generated matcher for the biome masks of a condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BiomeFilter {
    pub include: BiomeSet,
    pub exclude: BiomeSet,
    /// Any one included biome suffices (otherwise all are required).
    pub match_any: bool,
    /// Allow the cheaper 1:4 grid where 1:1 was asked for.
    pub approx: bool,
}

/// Running state while rasterising an area against a [`BiomeFilter`].
#[derive(Debug, Clone, Copy)]
pub struct BiomeTally<'a> {
    filter: &'a BiomeFilter,
    seen: BiomeSet,
    rejected: bool,
}

impl<'a> BiomeTally<'a> {
    pub fn new(filter: &'a BiomeFilter) -> Self {
        Self {
            filter,
            seen: BiomeSet::default(),
            rejected: false,
        }
    }

    /// Record one cell. Returns `true` once the outcome is fixed and the
    /// scan may stop early.
    pub fn observe(&mut self, id: i32) -> bool {
        if self.filter.exclude.contains(id) {
            self.rejected = true;
            return true;
        }
        if self.filter.include.contains(id) {
            self.seen.insert(id);
        }
        self.filter.exclude.is_empty() && self.requirements_met()
    }

    fn requirements_met(&self) -> bool {
        let include = &self.filter.include;
        if include.is_empty() {
            return true;
        }
        if self.filter.match_any {
            !self.seen.is_empty()
        } else {
            self.seen.is_superset(include)
        }
    }

    pub fn satisfied(&self) -> bool {
        !self.rejected && self.requirements_met()
    }
}

// ---------------------------------------------------------------------------
// Byte helpers
// ---------------------------------------------------------------------------

struct ByteWriter<'a> {
    buf: &'a mut [u8],
    at: usize,
}

impl<'a> ByteWriter<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, at: 0 }
    }

    fn bytes(&mut self, b: &[u8]) {
        self.buf[self.at..self.at + b.len()].copy_from_slice(b);
        self.at += b.len();
    }

    fn skip(&mut self, n: usize) {
        self.at += n;
    }

    fn u8(&mut self, v: u8) {
        self.bytes(&[v]);
    }

    fn u16(&mut self, v: u16) {
        self.bytes(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.bytes(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.bytes(&v.to_le_bytes());
    }
}

struct ByteReader<'a> {
    buf: &'a [u8],
    at: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, at: 0 }
    }

    fn bytes(&mut self, n: usize) -> &'a [u8] {
        let s = &self.buf[self.at..self.at + n];
        self.at += n;
        s
    }

    fn skip(&mut self, n: usize) {
        self.at += n;
    }

    fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N));
        out
    }

    fn u8(&mut self) -> u8 {
        self.array::<1>()[0]
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.array())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.array())
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.array())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.array())
    }
}

/// Lowercase hex without prefix.
mod hex {
    use crate::error::ConditionError;

    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Decode pairs of hex digits; a trailing odd digit is ignored.
    pub fn decode(s: &str) -> Result<Vec<u8>, ConditionError> {
        let digits = s.as_bytes();
        (0..digits.len() / 2)
            .map(|i| {
                let pair = std::str::from_utf8(&digits[2 * i..2 * i + 2])
                    .map_err(|_| ConditionError::MalformedHex(i))?;
                u8::from_str_radix(pair, 16).map_err(|_| ConditionError::MalformedHex(i))
            })
            .collect()
    }
}
