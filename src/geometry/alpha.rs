//! External alpha-shape engine invocation.
//!
//! Points are handed to the engine through a scratch file: first line the
//! integer point count, then one `<lon> <lat>` pair per line. The engine is
//! invoked twice per computation (once at the caller's alpha, once for its
//! own optimal alpha) and its stdout is returned unmodified.
//!
//! Engine failure is recoverable and never retried: unlike a rate-limited
//! endpoint, a missing binary or bad input geometry fails the same way
//! every time. The orchestrator substitutes a diagnostic placeholder so the
//! surrounding report is still produced.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::harvest::place::Place;

/// Prefix of scratch files handed to the engine.
const SCRATCH_PREFIX: &str = "vagueplace";

/// Outcome of one alpha-shape computation.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaShapeResult {
    /// The alpha the shape was computed at (0 on engine failure).
    pub alpha: f64,
    /// The engine's notion of an optimal alpha (0 on engine failure).
    pub optimal_alpha: f64,
    /// Raw WKT text captured from the engine, one polygon per line, or a
    /// diagnostic placeholder on failure.
    pub wkt: String,
}

impl AlphaShapeResult {
    /// The captured polygons, one per non-empty output line.
    pub fn polygons(&self) -> impl Iterator<Item = &str> {
        self.wkt.lines().filter(|line| !line.trim().is_empty())
    }
}

/// Writes the coordinate-count-prefixed scratch file the engine consumes.
///
/// Coordinate text is written verbatim, preserving the source's decimal
/// precision.
///
/// # Errors
///
/// Returns `AppError::Scratch` on any I/O failure; this aborts the
/// orchestration since the engine has nothing to read.
pub fn write_scratch(places: &[Place]) -> Result<NamedTempFile, AppError> {
    let mut file = tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempfile()
        .map_err(|e| AppError::Scratch(format!("Failed to create scratch file: {}", e)))?;

    writeln!(file, "{}", places.len())
        .map_err(|e| AppError::Scratch(format!("Failed to write scratch file: {}", e)))?;
    for place in places {
        writeln!(file, "{} {}", place.longitude, place.latitude)
            .map_err(|e| AppError::Scratch(format!("Failed to write scratch file: {}", e)))?;
    }
    file.flush()
        .map_err(|e| AppError::Scratch(format!("Failed to flush scratch file: {}", e)))?;

    Ok(file)
}

/// Handle to the external alpha-shape executable.
pub struct AlphaShaper {
    engine: PathBuf,
}

impl AlphaShaper {
    /// Creates a shaper invoking the executable at `engine`.
    pub fn new(engine: impl Into<PathBuf>) -> Self {
        Self {
            engine: engine.into(),
        }
    }

    /// Computes the alpha shape of the points in `scratch` at `alpha`.
    ///
    /// Runs `engine -i <scratch> -a <alpha>` for the shape and
    /// `engine -i <scratch> --optimalalpha` for the engine's optimal alpha.
    /// On any failure the result carries a diagnostic placeholder and zero
    /// alphas; the error never propagates.
    pub async fn compute(&self, scratch: &Path, alpha: f64) -> AlphaShapeResult {
        match self.run(scratch, alpha).await {
            Ok(result) => result,
            Err(e) => {
                warn!(engine = %self.engine.display(), error = %e, "alpha-shape engine failed");
                AlphaShapeResult {
                    alpha: 0.0,
                    optimal_alpha: 0.0,
                    wkt: format!(
                        "Error executing: {} -i {} -a {}: {}",
                        self.engine.display(),
                        scratch.display(),
                        alpha,
                        e
                    ),
                }
            }
        }
    }

    async fn run(&self, scratch: &Path, alpha: f64) -> Result<AlphaShapeResult, AppError> {
        let wkt = self
            .capture(&["-i", &scratch.to_string_lossy(), "-a", &alpha.to_string()])
            .await?;
        let optimal_raw = self
            .capture(&["-i", &scratch.to_string_lossy(), "--optimalalpha"])
            .await?;
        let optimal_alpha = optimal_raw.trim().parse::<f64>().map_err(|_| {
            AppError::Internal(format!(
                "Engine returned a non-numeric optimal alpha: {}",
                optimal_raw.trim()
            ))
        })?;

        debug!(alpha, optimal_alpha, "alpha shape computed");
        Ok(AlphaShapeResult {
            alpha,
            optimal_alpha,
            wkt,
        })
    }

    /// Runs the engine once and captures stdout.
    async fn capture(&self, args: &[&str]) -> Result<String, AppError> {
        let output = Command::new(&self.engine)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                AppError::Internal(format!(
                    "Failed to run {}: {}",
                    self.engine.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Internal(format!(
                "{} exited with {}: {}",
                self.engine.display(),
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|_| AppError::Internal("Engine output is not UTF-8".to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn place(lon: &str, lat: &str) -> Place {
        Place {
            name: "p".to_string(),
            latitude: lat.to_string(),
            longitude: lon.to_string(),
            country: String::new(),
            url: String::new(),
            abstract_text: String::new(),
        }
    }

    #[test]
    fn scratch_file_is_count_prefixed_with_verbatim_coordinates() {
        let places = vec![place("2.8249", "41.98310000"), place("-1.5", "47.2")];
        let scratch = write_scratch(&places).unwrap();
        let content = fs::read_to_string(scratch.path()).unwrap();
        assert_eq!(content, "2\n2.8249 41.98310000\n-1.5 47.2\n");
    }

    #[test]
    fn empty_scratch_file_has_zero_count_line() {
        let scratch = write_scratch(&[]).unwrap();
        let content = fs::read_to_string(scratch.path()).unwrap();
        assert_eq!(content, "0\n");
    }

    #[tokio::test]
    async fn missing_engine_falls_back_to_diagnostic() {
        let shaper = AlphaShaper::new("/nonexistent/alpha_shaper");
        let scratch = write_scratch(&[place("1", "1")]).unwrap();

        let result = shaper.compute(scratch.path(), 0.1).await;
        assert_eq!(result.alpha, 0.0);
        assert_eq!(result.optimal_alpha, 0.0);
        assert!(result.wkt.contains("Error executing"));
        assert!(result.wkt.contains("-a 0.1"));
    }

    #[cfg(unix)]
    fn fake_engine(dir: &tempfile::TempDir, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join("alpha_shaper");
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn engine_output_is_returned_unmodified() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = fake_engine(
            &dir,
            "#!/bin/sh\n\
             for a in \"$@\"; do\n\
               if [ \"$a\" = \"--optimalalpha\" ]; then echo \"0.25\"; exit 0; fi\n\
             done\n\
             echo \"POLYGON((0 0,1 0,1 1,0 0))\"\n\
             echo \"POLYGON((5 5,6 5,6 6,5 5))\"\n",
        );

        let shaper = AlphaShaper::new(engine);
        let scratch = write_scratch(&[place("1", "1")]).unwrap();
        let result = shaper.compute(scratch.path(), 0.1).await;

        assert_eq!(result.alpha, 0.1);
        assert_eq!(result.optimal_alpha, 0.25);
        assert_eq!(result.polygons().count(), 2);
        assert_eq!(
            result.polygons().next().unwrap(),
            "POLYGON((0 0,1 0,1 1,0 0))"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_falls_back_to_diagnostic() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = fake_engine(&dir, "#!/bin/sh\necho \"bad input\" >&2\nexit 2\n");

        let shaper = AlphaShaper::new(engine);
        let scratch = write_scratch(&[place("1", "1")]).unwrap();
        let result = shaper.compute(scratch.path(), 0.5).await;

        assert_eq!(result.alpha, 0.0);
        assert!(result.wkt.contains("Error executing"));
    }
}
