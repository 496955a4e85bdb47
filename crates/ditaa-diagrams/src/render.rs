//! Diagram rendering via an external tool.
//!
//! [`DiagramRenderer`] is the injected rendering capability: diagram text and
//! options in, one [`RenderedImage`] per requested format out. The pipeline
//! only talks to this trait, so tests substitute fakes.
//!
//! [`CommandRenderer`] runs the real executable:
//! - Writes the text, in the declared encoding, to a scratch directory that is
//!   removed on every exit path
//! - Builds arguments deterministically from [`RenderOptions`]
//! - Enforces a timeout and honours the build's [`AbortSignal`]
//! - Captures stderr/stdout for failure diagnostics

use std::ffi::OsString;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ditaa_cache::{ArtifactFormat, RenderedImage};

use crate::abort::AbortSignal;
use crate::consts::{DEFAULT_TIMEOUT, POLL_INTERVAL};
use crate::dimensions::measure;
use crate::options::RenderOptions;
use crate::resolve::DiagramSource;

/// Rendering error.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The tool failed or produced unusable output.
    #[error("{message}\n{diagnostics}")]
    Failure {
        /// What went wrong.
        message: String,
        /// Captured `[stderr]`/`[stdout]` of the tool.
        diagnostics: String,
    },
    /// The tool did not finish in time and was killed.
    #[error("{command} did not finish within {}s and was terminated", .timeout.as_secs_f64())]
    Timeout {
        /// Executable that timed out.
        command: String,
        /// Configured limit.
        timeout: Duration,
    },
    /// The executable does not exist.
    #[error("{command} cannot be run: check the tool command and arguments settings")]
    ToolNotFound {
        /// Executable that could not be spawned.
        command: String,
    },
    /// The build was aborted.
    #[error("render cancelled")]
    Cancelled,
    /// Scratch file or process I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rendering capability used by the pipeline.
pub trait DiagramRenderer: Send + Sync {
    /// Render `source` once per format in `options.output_formats`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if any requested format cannot be produced.
    fn render(
        &self,
        source: &DiagramSource,
        options: &RenderOptions,
    ) -> Result<Vec<RenderedImage>, RenderError>;
}

/// Build the tool argument list for one output format.
///
/// Layout: `[extra args] --scale=S --tabs=N [flags] [--encoding=E] [--svg] <input> <output>`.
#[must_use]
pub fn build_args(
    extra_args: &[String],
    options: &RenderOptions,
    format: ArtifactFormat,
    input: &Path,
    output: &Path,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = extra_args.iter().map(OsString::from).collect();
    args.push(format!("--scale={}", options.scale).into());
    args.push(format!("--tabs={}", options.tab_size).into());
    if options.rounded_corners {
        args.push("--round-corners".into());
    }
    if options.no_shadows {
        args.push("--no-shadows".into());
    }
    if options.no_separation {
        args.push("--no-separation".into());
    }
    if let Some(encoding) = &options.encoding {
        args.push(format!("--encoding={encoding}").into());
    }
    if format == ArtifactFormat::Vector {
        args.push("--svg".into());
    }
    args.push(input.into());
    args.push(output.into());
    args
}

/// [`DiagramRenderer`] that runs an external executable.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use ditaa_diagrams::{AbortSignal, CommandRenderer};
///
/// let abort = AbortSignal::new();
/// let renderer = CommandRenderer::new("java")
///     .args(&["-jar".to_owned(), "/opt/ditaa.jar".to_owned()])
///     .timeout(Duration::from_secs(60))
///     .abort_signal(abort.clone());
/// ```
#[derive(Debug)]
pub struct CommandRenderer {
    command: String,
    extra_args: Vec<String>,
    timeout: Duration,
    abort: AbortSignal,
    /// Set once the executable turned out to be missing; later renders fail fast.
    tool_missing: AtomicBool,
}

impl CommandRenderer {
    /// Create a renderer for the given executable.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            extra_args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            abort: AbortSignal::new(),
            tool_missing: AtomicBool::new(false),
        }
    }

    /// Set extra arguments placed before the option flags.
    #[must_use]
    pub fn args(mut self, args: &[String]) -> Self {
        self.extra_args = args.to_vec();
        self
    }

    /// Set the per-invocation timeout (default: 30 seconds).
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Share the build's abort signal.
    #[must_use]
    pub fn abort_signal(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    /// Run the tool for one format and return the captured diagnostics.
    fn run(
        &self,
        options: &RenderOptions,
        format: ArtifactFormat,
        input: &Path,
        output: &Path,
    ) -> Result<String, RenderError> {
        let args = build_args(&self.extra_args, options, format, input, output);
        let mut child = match Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if !self.tool_missing.swap(true, Ordering::AcqRel) {
                    tracing::warn!(
                        command = %self.command,
                        "diagram tool cannot be run: check the tool command and arguments settings"
                    );
                }
                return Err(self.tool_not_found());
            }
            Err(e) => return Err(e.into()),
        };

        // Drain pipes concurrently so a chatty tool cannot block on a full pipe
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait(&mut child)?;
        let diagnostics = format!(
            "[stderr]\n{}\n[stdout]\n{}",
            join_output(stderr),
            join_output(stdout)
        );

        if !status.success() {
            return Err(RenderError::Failure {
                message: format!("{} exited with error ({status})", self.command),
                diagnostics,
            });
        }
        Ok(diagnostics)
    }

    /// Wait for the child, killing it on timeout or abort.
    fn wait(&self, child: &mut Child) -> Result<ExitStatus, RenderError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if self.abort.is_raised() {
                terminate(child);
                return Err(RenderError::Cancelled);
            }
            if Instant::now() >= deadline {
                terminate(child);
                return Err(RenderError::Timeout {
                    command: self.command.clone(),
                    timeout: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn tool_not_found(&self) -> RenderError {
        RenderError::ToolNotFound {
            command: self.command.clone(),
        }
    }
}

impl DiagramRenderer for CommandRenderer {
    fn render(
        &self,
        source: &DiagramSource,
        options: &RenderOptions,
    ) -> Result<Vec<RenderedImage>, RenderError> {
        if self.tool_missing.load(Ordering::Acquire) {
            return Err(self.tool_not_found());
        }
        if self.abort.is_raised() {
            return Err(RenderError::Cancelled);
        }

        // Removed when dropped, whichever way this function returns
        let scratch = tempfile::Builder::new().prefix("ditaa-").tempdir()?;
        let input = scratch.path().join("diagram.txt");
        std::fs::write(&input, encode_text(source, options)?)?;

        options
            .output_formats
            .iter()
            .map(|&format| {
                let output = scratch
                    .path()
                    .join(format!("diagram.{}", format.extension()));
                let diagnostics = self.run(options, format, &input, &output)?;
                read_output(format, &output, diagnostics)
            })
            .collect()
    }
}

/// Diagram text as bytes in the encoding the tool is told to expect.
fn encode_text(source: &DiagramSource, options: &RenderOptions) -> Result<Vec<u8>, RenderError> {
    let encoding = options
        .text_encoding()
        .map_err(|e| RenderError::Failure {
            message: e.to_string(),
            diagnostics: String::new(),
        })?;
    let (bytes, _, unmappable) = encoding.encode(source.text());
    if unmappable {
        return Err(RenderError::Failure {
            message: format!("diagram text cannot be represented in {}", encoding.name()),
            diagnostics: String::new(),
        });
    }
    Ok(bytes.into_owned())
}

/// Read and measure a produced file.
fn read_output(
    format: ArtifactFormat,
    path: &Path,
    diagnostics: String,
) -> Result<RenderedImage, RenderError> {
    let failure = |message: String| RenderError::Failure {
        message,
        diagnostics: diagnostics.clone(),
    };

    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(failure(format!("no {format} output file was produced")));
        }
        Err(e) => return Err(failure(format!("{format} output is unreadable: {e}"))),
    };
    if data.is_empty() {
        return Err(failure(format!("{format} output file is empty")));
    }
    let (width, height) = measure(format, &data)
        .ok_or_else(|| failure(format!("{format} output is not a valid image")))?;

    Ok(RenderedImage::new(format, data, width, height))
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut reader) = pipe {
            let _ = reader.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_output(handle: JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::DiagramOrigin;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    fn source(text: &str) -> DiagramSource {
        DiagramSource::new(text, DiagramOrigin::Inline)
    }

    #[test]
    fn test_build_args_defaults() {
        let args = build_args(
            &[],
            &RenderOptions::default(),
            ArtifactFormat::Raster,
            Path::new("in.txt"),
            Path::new("out.png"),
        );
        assert_eq!(
            strings(&args),
            vec!["--scale=1", "--tabs=8", "in.txt", "out.png"]
        );
    }

    #[test]
    fn test_build_args_all_options() {
        let options = RenderOptions {
            scale: 2.0,
            tab_size: 4,
            rounded_corners: true,
            no_shadows: true,
            no_separation: true,
            encoding: Some("UTF-8".to_owned()),
            output_formats: BTreeSet::from([ArtifactFormat::Vector]),
        };
        let args = build_args(
            &["-jar".to_owned(), "ditaa.jar".to_owned()],
            &options,
            ArtifactFormat::Vector,
            Path::new("in.txt"),
            Path::new("out.svg"),
        );
        assert_eq!(
            strings(&args),
            vec![
                "-jar",
                "ditaa.jar",
                "--scale=2",
                "--tabs=4",
                "--round-corners",
                "--no-shadows",
                "--no-separation",
                "--encoding=UTF-8",
                "--svg",
                "in.txt",
                "out.svg",
            ]
        );
    }

    #[test]
    fn test_build_args_fractional_scale() {
        let options = RenderOptions {
            scale: 1.5,
            ..RenderOptions::default()
        };
        let args = build_args(
            &[],
            &options,
            ArtifactFormat::Raster,
            Path::new("a"),
            Path::new("b"),
        );
        assert!(strings(&args).contains(&"--scale=1.5".to_owned()));
    }

    #[test]
    fn test_encode_text_in_declared_encoding() {
        let latin1 = RenderOptions {
            encoding: Some("ISO-8859-1".to_owned()),
            ..RenderOptions::default()
        };

        assert_eq!(encode_text(&source("\u{c4}"), &latin1).unwrap(), vec![0xC4]);
        assert_eq!(
            encode_text(&source("\u{c4}"), &RenderOptions::default()).unwrap(),
            vec![0xC3, 0x84]
        );
    }

    #[test]
    fn test_encode_text_unmappable_is_failure() {
        let latin1 = RenderOptions {
            encoding: Some("ISO-8859-1".to_owned()),
            ..RenderOptions::default()
        };

        let err = encode_text(&source("\u{2192}"), &latin1).unwrap_err();

        assert!(err.to_string().contains("cannot be represented in windows-1252"));
    }

    #[test]
    fn test_read_output_missing_file() {
        let err = read_output(
            ArtifactFormat::Raster,
            Path::new("/nonexistent/out.png"),
            "[stderr]\nboom\n[stdout]\n".to_owned(),
        )
        .unwrap_err();
        match err {
            RenderError::Failure {
                message,
                diagnostics,
            } => {
                assert!(message.contains("no raster output"));
                assert!(diagnostics.contains("boom"));
            }
            other => panic!("expected Failure, got {other:?}"),
        }
    }

    #[test]
    fn test_read_output_empty_and_invalid() {
        let tmp = tempfile::TempDir::new().unwrap();
        let empty = tmp.path().join("empty.png");
        std::fs::write(&empty, b"").unwrap();
        let garbage = tmp.path().join("garbage.png");
        std::fs::write(&garbage, b"not an image").unwrap();

        let err = read_output(ArtifactFormat::Raster, &empty, String::new()).unwrap_err();
        assert!(err.to_string().contains("empty"));

        let err = read_output(ArtifactFormat::Raster, &garbage, String::new()).unwrap_err();
        assert!(err.to_string().contains("not a valid image"));
    }

    #[test]
    fn test_missing_tool_reported_once_then_fast_fails() {
        let renderer = CommandRenderer::new("/nonexistent/ditaa-binary");

        let first = renderer
            .render(&source("A --> B"), &RenderOptions::default())
            .unwrap_err();
        assert!(matches!(first, RenderError::ToolNotFound { .. }));
        assert!(renderer.tool_missing.load(Ordering::Acquire));

        let second = renderer
            .render(&source("A --> B"), &RenderOptions::default())
            .unwrap_err();
        assert!(matches!(second, RenderError::ToolNotFound { .. }));
    }

    #[test]
    fn test_raised_abort_skips_render() {
        let abort = AbortSignal::new();
        abort.raise();
        let renderer = CommandRenderer::new("/nonexistent/ditaa-binary").abort_signal(abort);

        let err = renderer
            .render(&source("A --> B"), &RenderOptions::default())
            .unwrap_err();
        assert!(matches!(err, RenderError::Cancelled));
    }

    /// Process-level tests using a shell script in place of the real tool.
    #[cfg(unix)]
    mod process {
        use super::*;
        use pretty_assertions::assert_eq;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        /// Write an executable script; `$IN`/`$OUT` are the last two arguments.
        fn script(dir: &TempDir, body: &str) -> PathBuf {
            let path = dir.path().join("fake-ditaa");
            let content = format!(
                "#!/bin/sh\nfor a in \"$@\"; do IN=\"$OUT\"; OUT=\"$a\"; done\necho \"$@\" >> \"{log}\"\n{body}\n",
                log = dir.path().join("calls.log").display()
            );
            std::fs::write(&path, content).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn png_writer(dir: &TempDir) -> PathBuf {
            let png = dir.path().join("fixture.png");
            std::fs::write(&png, crate::dimensions::tests::png_header(64, 32)).unwrap();
            script(
                dir,
                &format!(
                    "grep -q 'A --> B' \"$IN\" || exit 3\ncp \"{}\" \"$OUT\"",
                    png.display()
                ),
            )
        }

        fn calls(dir: &TempDir) -> String {
            std::fs::read_to_string(dir.path().join("calls.log")).unwrap_or_default()
        }

        #[test]
        fn test_renders_raster() {
            let dir = TempDir::new().unwrap();
            let renderer = CommandRenderer::new(png_writer(&dir).display().to_string());

            let images = renderer
                .render(&source("A --> B"), &RenderOptions::default())
                .unwrap();

            assert_eq!(images.len(), 1);
            assert_eq!(images[0].format, ArtifactFormat::Raster);
            assert_eq!((images[0].width, images[0].height), (64, 32));
            assert!(calls(&dir).contains("--scale=1 --tabs=8"));
        }

        #[test]
        fn test_scratch_file_written_in_declared_encoding() {
            let dir = TempDir::new().unwrap();
            let png = dir.path().join("fixture.png");
            std::fs::write(&png, crate::dimensions::tests::png_header(8, 8)).unwrap();
            let copy = dir.path().join("seen.txt");
            let tool = script(
                &dir,
                &format!(
                    "cp \"$IN\" \"{}\"\ncp \"{}\" \"$OUT\"",
                    copy.display(),
                    png.display()
                ),
            );
            let options = RenderOptions {
                encoding: Some("ISO-8859-1".to_owned()),
                ..RenderOptions::default()
            };

            CommandRenderer::new(tool.display().to_string())
                .render(&source("| \u{c4}rger |"), &options)
                .unwrap();

            assert_eq!(std::fs::read(&copy).unwrap(), b"| \xC4rger |".to_vec());
            assert!(calls(&dir).contains("--encoding=ISO-8859-1"));
        }

        #[test]
        fn test_scale_reaches_tool_arguments() {
            let dir = TempDir::new().unwrap();
            let renderer = CommandRenderer::new(png_writer(&dir).display().to_string());
            let options = RenderOptions {
                scale: 2.0,
                ..RenderOptions::default()
            };

            renderer.render(&source("A --> B"), &options).unwrap();

            assert!(calls(&dir).contains("--scale=2"));
        }

        #[test]
        fn test_one_invocation_per_format() {
            let dir = TempDir::new().unwrap();
            let tool = script(
                &dir,
                "case \"$OUT\" in\n*.svg) echo '<svg width=\"10\" height=\"5\"></svg>' > \"$OUT\" ;;\n*) printf '\\211PNG\\r\\n\\032\\n\\000\\000\\000\\rIHDR\\000\\000\\000\\012\\000\\000\\000\\005' > \"$OUT\" ;;\nesac",
            );
            let renderer = CommandRenderer::new(tool.display().to_string());
            let options = RenderOptions {
                output_formats: BTreeSet::from([ArtifactFormat::Raster, ArtifactFormat::Vector]),
                ..RenderOptions::default()
            };

            let images = renderer.render(&source("A --> B"), &options).unwrap();

            let formats: Vec<_> = images.iter().map(|i| i.format).collect();
            assert_eq!(formats, vec![ArtifactFormat::Raster, ArtifactFormat::Vector]);
            assert!(images.iter().all(|i| (i.width, i.height) == (10, 5)));
            let log = calls(&dir);
            assert_eq!(log.lines().count(), 2);
            assert!(log.lines().nth(1).unwrap().contains("--svg"));
        }

        #[test]
        fn test_nonzero_exit_carries_diagnostics() {
            let dir = TempDir::new().unwrap();
            let tool = script(&dir, "echo 'parse error at line 3' >&2\nexit 2");
            let renderer = CommandRenderer::new(tool.display().to_string());

            let err = renderer
                .render(&source("A --> B"), &RenderOptions::default())
                .unwrap_err();

            match err {
                RenderError::Failure { diagnostics, .. } => {
                    assert!(diagnostics.contains("[stderr]\nparse error at line 3"));
                }
                other => panic!("expected Failure, got {other:?}"),
            }
        }

        #[test]
        fn test_success_without_output_is_failure() {
            let dir = TempDir::new().unwrap();
            let tool = script(&dir, "echo 'done'");
            let renderer = CommandRenderer::new(tool.display().to_string());

            let err = renderer
                .render(&source("A --> B"), &RenderOptions::default())
                .unwrap_err();

            assert!(err.to_string().contains("no raster output file"));
            assert!(err.to_string().contains("[stdout]\ndone"));
        }

        #[test]
        fn test_timeout_kills_tool() {
            let dir = TempDir::new().unwrap();
            let tool = script(&dir, "exec sleep 5");
            let renderer = CommandRenderer::new(tool.display().to_string())
                .timeout(Duration::from_millis(200));

            let start = Instant::now();
            let err = renderer
                .render(&source("A --> B"), &RenderOptions::default())
                .unwrap_err();

            assert!(matches!(err, RenderError::Timeout { .. }));
            assert!(start.elapsed() < Duration::from_secs(4));
        }

        #[test]
        fn test_abort_kills_running_tool() {
            let dir = TempDir::new().unwrap();
            let tool = script(&dir, "exec sleep 5");
            let abort = AbortSignal::new();
            let renderer = CommandRenderer::new(tool.display().to_string())
                .abort_signal(abort.clone());

            let raiser = thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                abort.raise();
            });
            let err = renderer
                .render(&source("A --> B"), &RenderOptions::default())
                .unwrap_err();
            raiser.join().unwrap();

            assert!(matches!(err, RenderError::Cancelled));
        }

        #[test]
        fn test_scratch_directory_removed() {
            let dir = TempDir::new().unwrap();
            // Record the scratch input path so we can check it afterwards
            let tool = script(
                &dir,
                &format!(
                    "echo \"$IN\" > \"{}\"\nexit 1",
                    dir.path().join("input-path").display()
                ),
            );
            let renderer = CommandRenderer::new(tool.display().to_string());

            let _ = renderer.render(&source("A --> B"), &RenderOptions::default());

            let input = std::fs::read_to_string(dir.path().join("input-path")).unwrap();
            let input = PathBuf::from(input.trim());
            assert!(!input.exists());
            assert!(!input.parent().unwrap().exists());
        }
    }
}
