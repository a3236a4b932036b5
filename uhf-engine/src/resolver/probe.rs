use anyhow::{anyhow, Result};
use lofty::prelude::*;
use lofty::probe::Probe;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

/// Something that can tell how long a media file plays.
pub trait DurationProbe: Send + Sync {
    /// Duration in seconds, `0.0` when it cannot be determined.
    fn probe_duration(&self, path: &Path) -> f64;
}

/// Rounds a probed duration up to whole seconds. Anything that is not a
/// positive finite number is 0.
pub fn whole_seconds(seconds: f64) -> u32 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    seconds.ceil().min(u32::MAX as f64) as u32
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Program used as the fallback probe.
    pub ffprobe_path: String,
    /// Extensions for which the fallback probe runs after the primary one
    /// came back empty.
    pub fallback_extensions: Vec<String>,
    /// Extensions accepted when turning files into resources.
    pub supported_extensions: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ffprobe_path: "ffprobe".to_string(),
            fallback_extensions: vec!["mkv".to_string()],
            supported_extensions: ["avi", "mov", "mkv", "mp4", "m4v"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl ProbeConfig {
    pub fn is_supported(&self, path: &Path) -> bool {
        extension_of(path)
            .map(|ext| self.supported_extensions.iter().any(|s| s.eq_ignore_ascii_case(&ext)))
            .unwrap_or(false)
    }
}

/// Reads the duration from container metadata (MP4 family and the audio
/// formats lofty understands).
#[derive(Debug, Default, Clone)]
pub struct ContainerProbe;

impl ContainerProbe {
    fn read_duration(path: &Path) -> Result<f64> {
        let tagged_file = Probe::open(path)?.read()?;
        Ok(tagged_file.properties().duration().as_secs_f64())
    }
}

impl DurationProbe for ContainerProbe {
    fn probe_duration(&self, path: &Path) -> f64 {
        match Self::read_duration(path) {
            Ok(seconds) => seconds,
            Err(e) => {
                tracing::debug!("Container probe failed for {:?}: {}", path, e);
                0.0
            }
        }
    }
}

/// Asks an external `ffprobe` for the container duration.
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: PathBuf,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn read_duration(&self, path: &Path) -> Result<f64> {
        let output = Command::new(&self.program)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(path)
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("ffprobe failed: {}", stderr.trim()));
        }

        let stdout = String::from_utf8(output.stdout)?;
        parse_ffprobe_duration(&stdout)
    }
}

/// Accepts both the bare value printed with `nokey=1` and the
/// `duration=<secs>` line of a `-show_format` dump.
fn parse_ffprobe_duration(output: &str) -> Result<f64> {
    for line in output.lines() {
        let value = line.trim().strip_prefix("duration=").unwrap_or(line.trim());
        if let Ok(seconds) = value.parse::<f64>() {
            return Ok(seconds);
        }
    }
    Err(anyhow!("no duration in ffprobe output"))
}

impl DurationProbe for FfprobeProbe {
    fn probe_duration(&self, path: &Path) -> f64 {
        match self.read_duration(path) {
            Ok(seconds) => seconds,
            Err(e) => {
                tracing::debug!("ffprobe could not read {:?}: {}", path, e);
                0.0
            }
        }
    }
}

/// Primary probe first; the fallback only runs for the configured
/// extensions and only when the primary one found nothing.
#[derive(Clone)]
pub struct ProbeChain {
    primary: Arc<dyn DurationProbe>,
    fallback: Option<Arc<dyn DurationProbe>>,
    fallback_extensions: Vec<String>,
}

impl ProbeChain {
    pub fn new(
        primary: Arc<dyn DurationProbe>,
        fallback: Option<Arc<dyn DurationProbe>>,
        fallback_extensions: Vec<String>,
    ) -> Self {
        Self {
            primary,
            fallback,
            fallback_extensions,
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(
            Arc::new(ContainerProbe),
            Some(Arc::new(FfprobeProbe::new(&config.ffprobe_path))),
            config.fallback_extensions.clone(),
        )
    }

    fn wants_fallback(&self, path: &Path) -> bool {
        extension_of(path)
            .map(|ext| {
                self.fallback_extensions
                    .iter()
                    .any(|f| f.eq_ignore_ascii_case(&ext))
            })
            .unwrap_or(false)
    }
}

impl DurationProbe for ProbeChain {
    fn probe_duration(&self, path: &Path) -> f64 {
        let seconds = self.primary.probe_duration(path);
        if seconds > 0.0 {
            return seconds;
        }
        match &self.fallback {
            Some(fallback) if self.wants_fallback(path) => fallback.probe_duration(path),
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        seconds: f64,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(seconds: f64) -> Arc<Self> {
            Arc::new(Self {
                seconds,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl DurationProbe for Fixed {
        fn probe_duration(&self, _path: &Path) -> f64 {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seconds
        }
    }

    #[test]
    fn test_whole_seconds_rounds_up() {
        assert_eq!(whole_seconds(0.0), 0);
        assert_eq!(whole_seconds(-3.0), 0);
        assert_eq!(whole_seconds(f64::NAN), 0);
        assert_eq!(whole_seconds(0.2), 1);
        assert_eq!(whole_seconds(1320.0), 1320);
        assert_eq!(whole_seconds(1320.01), 1321);
    }

    #[test]
    fn test_fallback_only_for_listed_extensions() {
        let primary = Fixed::new(0.0);
        let fallback = Fixed::new(42.0);
        let chain = ProbeChain::new(primary.clone(), Some(fallback.clone()), vec!["mkv".into()]);

        assert_eq!(chain.probe_duration(Path::new("a.MKV")), 42.0);
        assert_eq!(chain.probe_duration(Path::new("a.mp4")), 0.0);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_fallback_skipped_when_primary_succeeds() {
        let fallback = Fixed::new(42.0);
        let chain = ProbeChain::new(Fixed::new(10.0), Some(fallback.clone()), vec!["mkv".into()]);
        assert_eq!(chain.probe_duration(Path::new("a.mkv")), 10.0);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_parse_ffprobe_duration() {
        assert_eq!(parse_ffprobe_duration("1320.480000\n").unwrap(), 1320.48);
        assert_eq!(
            parse_ffprobe_duration("[FORMAT]\nfilename=a.mkv\nduration=61.5\n[/FORMAT]\n").unwrap(),
            61.5
        );
        assert!(parse_ffprobe_duration("N/A\n").is_err());
    }

    #[test]
    fn test_missing_ffprobe_yields_zero() {
        let probe = FfprobeProbe::new("/nonexistent/ffprobe-binary");
        assert_eq!(probe.probe_duration(Path::new("a.mkv")), 0.0);
    }

    #[test]
    fn test_container_probe_unreadable_file_yields_zero() {
        assert_eq!(
            ContainerProbe.probe_duration(Path::new("/nonexistent/file.mp4")),
            0.0
        );
    }

    #[test]
    fn test_supported_extensions() {
        let config = ProbeConfig::default();
        assert!(config.is_supported(Path::new("movie.M4V")));
        assert!(!config.is_supported(Path::new("poster.jpg")));
        assert!(!config.is_supported(Path::new("README")));
    }
}
