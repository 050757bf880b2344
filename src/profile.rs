use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use anyhow::anyhow;

const TEMPORARY_SUFFIX: &str = ".tmp.mp4";

/// Suffix carried by profile names and output directories of earlier harness versions.
pub const LEGACY_SUFFIX: &str = "_cmd";

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Codec {
    H264,
    H265,
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::H264 => write!(f, "264"),
            Self::H265 => write!(f, "265"),
        }
    }
}

impl Codec {
    #[must_use]
    pub const fn library(&self) -> &'static str {
        match self {
            Self::H264 => "libx264",
            Self::H265 => "libx265",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tuning {
    Crf51,
    FastDecode,
    Grain,
    ZeroLatency,
}

impl std::fmt::Display for Tuning {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Crf51 => write!(f, "crf51"),
            Self::FastDecode => write!(f, "fastdecode"),
            Self::Grain => write!(f, "grain"),
            Self::ZeroLatency => write!(f, "zerolatency"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Preset {
    Slow,
    VeryFast,
    VerySlow,
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Slow => write!(f, "slow"),
            Self::VeryFast => write!(f, "veryfast"),
            Self::VerySlow => write!(f, "veryslow"),
        }
    }
}

/// At most one adjustment is applied on top of the shared base invocation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Variant {
    Base,
    Tuned(Tuning),
    Preset(Preset),
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Base => write!(f, "base"),
            Self::Tuned(tuning) => write!(f, "{tuning}"),
            Self::Preset(preset) => write!(f, "{preset}"),
        }
    }
}

impl Variant {
    const ALL: [Self; 8] = [
        Self::Base,
        Self::Tuned(Tuning::Crf51),
        Self::Tuned(Tuning::FastDecode),
        Self::Tuned(Tuning::Grain),
        Self::Preset(Preset::Slow),
        Self::Preset(Preset::VeryFast),
        Self::Preset(Preset::VerySlow),
        Self::Tuned(Tuning::ZeroLatency),
    ];

    #[must_use]
    pub fn extra_arguments(&self) -> Vec<String> {
        match self {
            Self::Base => vec![],
            Self::Tuned(Tuning::Crf51) => vec!["-crf".to_owned(), "51".to_owned()],
            Self::Tuned(tuning) => vec!["-tune".to_owned(), tuning.to_string()],
            Self::Preset(preset) => vec!["-preset".to_owned(), preset.to_string()],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodeProfile {
    name: String,
    codec: Codec,
    variant: Variant,
}

impl EncodeProfile {
    #[must_use]
    pub fn new(codec: Codec, variant: Variant) -> Self {
        Self {
            name: format!("{variant}_{codec}"),
            codec,
            variant,
        }
    }

    /// Name of the profile, which is also the name of its output subdirectory.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn codec(&self) -> Codec {
        self.codec
    }

    #[must_use]
    pub const fn variant(&self) -> Variant {
        self.variant
    }

    #[must_use]
    pub fn output_directory(&self, root: &Path) -> PathBuf {
        root.join(&self.name)
    }

    /// Builds the encoder arguments (without the program name) that transcode `input`
    /// into the temporary sibling of `output`.
    #[must_use]
    pub fn arguments(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut arguments: Vec<OsString> = vec![
            "-i".into(),
            input.into(),
            "-c:v".into(),
            self.codec.library().into(),
            "-vf".into(),
            "scale=in_range=full:out_range=tv".into(),
            "-color_range".into(),
            "tv".into(),
        ];

        arguments.extend(self.variant.extra_arguments().into_iter().map(OsString::from));

        arguments.push("-movflags".into());
        arguments.push("+faststart".into());
        arguments.push(temporary_path(output).into_os_string());

        arguments
    }
}

/// Path the encoder writes to before the result is renamed onto `output`.
#[must_use]
pub fn temporary_path(output: &Path) -> PathBuf {
    let mut path = output.as_os_str().to_owned();
    path.push(TEMPORARY_SUFFIX);
    PathBuf::from(path)
}

#[must_use]
pub fn is_temporary(file_name: &OsStr) -> bool {
    file_name.to_string_lossy().ends_with(TEMPORARY_SUFFIX)
}

/// The fixed matrix of encoder profiles shared by the encode and metrics stages.
#[derive(Clone, Debug)]
pub struct Catalog {
    profiles: Vec<EncodeProfile>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        let profiles = Variant::ALL
            .iter()
            .flat_map(|variant| {
                [Codec::H264, Codec::H265]
                    .into_iter()
                    .map(|codec| EncodeProfile::new(codec, *variant))
            })
            .collect();

        Self { profiles }
    }

    #[must_use]
    pub fn profiles(&self) -> &[EncodeProfile] {
        &self.profiles
    }

    /// Looks up a profile by name. The `<profile>_cmd` spelling used by earlier versions of
    /// the harness is accepted as well.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&EncodeProfile> {
        let name = name.strip_suffix(LEGACY_SUFFIX).unwrap_or(name);

        self.profiles.iter().find(|profile| profile.name == name)
    }

    /// Resolves a subset of profile names, keeping catalog order. An empty selection means
    /// every profile.
    pub fn select(&self, names: &[String]) -> anyhow::Result<Vec<&EncodeProfile>> {
        if let Some(unknown) = names.iter().find(|name| self.find(name).is_none()) {
            return Err(anyhow!(
                "Unknown profile '{unknown}' (expected one of: {})",
                self.profiles
                    .iter()
                    .map(EncodeProfile::name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        Ok(self
            .profiles
            .iter()
            .filter(|profile| {
                names.is_empty() || names.iter().any(|name| self.find(name) == Some(*profile))
            })
            .collect())
    }
}
