use std::collections::BTreeSet;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;

use crate::catalog::{EmbedKind, StageMode};
use crate::config::BuildEnv;
use crate::error::{Error, Result};
use crate::planner::StagingItem;
use crate::util;

const MAX_LOG_CHARS: usize = 4096;

/// Execution context shared by the staging strategies: dry-run flag,
/// stdout logging and subprocess handling.
pub struct ExecCtx {
    pub dry_run: bool,
}

impl ExecCtx {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub fn log(&self, msg: &str) {
        println!("{msg}");
    }

    pub fn warn(&self, msg: &str) {
        println!("WARN: {msg}");
    }

    // Runs a subprocess with line-buffered, sanitized output. A non-zero
    // exit is an error; callers that cannot recover let it propagate and
    // abort the build invocation.
    pub fn run_cmd(&self, mut cmd: Command) -> Result<()> {
        if self.dry_run {
            self.log(&format!("DRY-RUN: {:?}", cmd));
            return Ok(());
        }

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::msg(format!("spawn failed: {e}")))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (tx, rx) = mpsc::channel::<String>();
        if let Some(out) = stdout {
            let tx = tx.clone();
            std::thread::spawn(move || read_output_stream(out, tx));
        }
        if let Some(err) = stderr {
            let tx = tx.clone();
            std::thread::spawn(move || read_output_stream(err, tx));
        }
        drop(tx);

        for line in rx {
            let line = sanitize_line(&line);
            if !line.is_empty() {
                self.log(&line);
            }
        }

        let status = child
            .wait()
            .map_err(|e| Error::msg(format!("wait failed: {e}")))?;
        if !status.success() {
            return Err(Error::msg(format!("command failed: {status}")));
        }
        Ok(())
    }
}

fn read_output_stream<R: Read>(reader: R, tx: mpsc::Sender<String>) {
    for line in BufReader::new(reader).lines() {
        match line {
            Ok(l) => {
                let _ = tx.send(l);
            }
            Err(_) => break,
        }
    }
}

// Strips terminal escape sequences and control characters so subprocess
// output cannot corrupt the log stream; long lines are truncated.
fn sanitize_line(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_LOG_CHARS));
    let mut count = 0usize;
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            match chars.next() {
                // CSI: swallow up to the final byte.
                Some('[') => {
                    for c in chars.by_ref() {
                        if ('@'..='~').contains(&c) {
                            break;
                        }
                    }
                }
                // OSC: swallow up to BEL.
                Some(']') => {
                    for c in chars.by_ref() {
                        if c == '\x07' {
                            break;
                        }
                    }
                }
                _ => {}
            }
            continue;
        }
        if c == '\t' {
            out.push(' ');
        } else if c.is_control() {
            continue;
        } else {
            out.push(c);
        }
        count += 1;
        if count >= MAX_LOG_CHARS {
            out.push_str(" ...[truncated]");
            break;
        }
    }
    out
}

/// One staging strategy. Each implementation picks the plan items carrying
/// its mode tag and ignores the rest.
pub trait StagingExecutor {
    fn run(&self, plan: &[StagingItem], ctx: &ExecCtx) -> Result<()>;
}

/// Copies selected assets into the filesystem-image staging directory.
pub struct CopyStager {
    pub out_dir: PathBuf,
    pub clear_first: bool,
}

impl StagingExecutor for CopyStager {
    fn run(&self, plan: &[StagingItem], ctx: &ExecCtx) -> Result<()> {
        if self.clear_first {
            ctx.log(&format!("clearing staging dir {}", self.out_dir.display()));
            if ctx.dry_run {
                // Nothing to do; the message above is the whole dry-run.
            } else if !util::clear_dir_entries(&self.out_dir)? {
                ctx.warn(&format!(
                    "{} does not exist or is not a directory",
                    self.out_dir.display()
                ));
            }
        }

        let items: Vec<&StagingItem> = plan
            .iter()
            .filter(|i| i.mode == StageMode::Copy)
            .collect();
        if items.is_empty() {
            ctx.log("no files selected for the filesystem image");
            return Ok(());
        }

        let mut seen = BTreeSet::<PathBuf>::new();
        for item in items {
            if !seen.insert(item.dest.clone()) {
                ctx.warn(&format!(
                    "duplicate destination {}; later match wins",
                    item.dest.display()
                ));
            }
            let dst = self.out_dir.join(&item.dest);
            if ctx.dry_run {
                ctx.log(&format!(
                    "DRY-RUN: copy {} -> {}",
                    item.source.display(),
                    dst.display()
                ));
                continue;
            }
            util::copy_file(&item.source, &dst)?;
            ctx.log(&format!(
                "copied {} -> {}",
                item.source.display(),
                dst.display()
            ));
        }
        Ok(())
    }
}

/// Pre/post hooks around the conversion of text-kind embedded items, used
/// by the enclosing build tooling to normalize bytes before conversion and
/// restore the file afterwards. Defaults do nothing.
pub trait EmbedHooks {
    fn prepare(&self, source: &Path) -> Result<()> {
        let _ = source;
        Ok(())
    }

    fn revert(&self, source: &Path) -> Result<()> {
        let _ = source;
        Ok(())
    }
}

pub struct NoHooks;

impl EmbedHooks for NoHooks {}

/// Converts selected assets into linkable objects and records them as link
/// inputs for the firmware image.
pub struct EmbedStager<'a> {
    pub build_dir: PathBuf,
    pub mcu: String,
    pub hooks: &'a dyn EmbedHooks,
}

impl StagingExecutor for EmbedStager<'_> {
    fn run(&self, plan: &[StagingItem], ctx: &ExecCtx) -> Result<()> {
        let items: Vec<&StagingItem> = plan
            .iter()
            .filter(|i| matches!(i.mode, StageMode::Embed { .. }))
            .collect();
        if items.is_empty() {
            ctx.log("no files selected for embedding");
            return Ok(());
        }

        if !ctx.dry_run {
            util::ensure_dir(&self.build_dir)?;
        }

        let mut registered = BTreeSet::<String>::new();
        let mut manifest_objects = Vec::new();
        for item in items {
            let object_name = object_file_name(&item.source);
            if !registered.insert(object_name.clone()) {
                ctx.warn(&format!(
                    "object {object_name} already registered; skipping {}",
                    item.source.display()
                ));
                continue;
            }
            let object = self.build_dir.join(&object_name);

            let text_kind = item.mode
                == StageMode::Embed {
                    kind: EmbedKind::Text,
                };
            if text_kind && !ctx.dry_run {
                self.hooks.prepare(&item.source)?;
            }
            let run_res = ctx
                .run_cmd(objcopy_command(&self.mcu, &item.source, &object))
                .map_err(|e| {
                    Error::msg(format!("conversion of {} failed: {e}", item.source.display()))
                });
            if text_kind && !ctx.dry_run {
                self.hooks.revert(&item.source)?;
            }
            run_res?;

            if !ctx.dry_run {
                ctx.log(&format!(
                    "embedded {} as {}",
                    item.source.display(),
                    object.display()
                ));
            }
            manifest_objects.push(serde_json::json!({
                "source": item.dest.display().to_string(),
                "object": object.display().to_string(),
            }));
        }

        if ctx.dry_run {
            return Ok(());
        }

        // The enclosing build tool reads this to append the objects to the
        // firmware link inputs and make the link target depend on them.
        let manifest = serde_json::json!({
            "mcu": self.mcu,
            "tool": objcopy_tool(&self.mcu),
            "objects": manifest_objects,
        });
        let manifest_path = self.build_dir.join("link_inputs.json");
        util::write_json_pretty(&manifest_path, &manifest)?;
        ctx.log(&format!("wrote {}", manifest_path.display()));
        Ok(())
    }
}

fn riscv_mcu(mcu: &str) -> bool {
    matches!(mcu, "esp32c3" | "esp32c6")
}

pub fn objcopy_tool(mcu: &str) -> String {
    if riscv_mcu(mcu) {
        "riscv32-esp-elf-objcopy".into()
    } else {
        format!("xtensa-{mcu}-elf-objcopy")
    }
}

pub fn object_file_name(source: &Path) -> String {
    let base = source
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{base}.txt.o")
}

// The section rename is the contract with the firmware runtime: it locates
// embedded data through the read-only section name.
fn objcopy_command(mcu: &str, source: &Path, object: &Path) -> Command {
    let (output_target, binary_arch) = if riscv_mcu(mcu) {
        ("elf32-littleriscv", "riscv")
    } else {
        ("elf32-xtensa-le", "xtensa")
    };
    let mut cmd = Command::new(objcopy_tool(mcu));
    cmd.args(["--input-target", "binary"])
        .args(["--output-target", output_target])
        .args(["--binary-architecture", binary_arch])
        .args(["--rename-section", ".data=.rodata.embedded"])
        .arg(source)
        .arg(object);
    cmd
}

/// Runs both staging strategies over one plan, copy first, then embed.
pub fn run_plan(plan: &[StagingItem], env: &BuildEnv, ctx: &ExecCtx) -> Result<()> {
    CopyStager {
        out_dir: env.fs_out_dir.clone(),
        clear_first: env.clear_fs_dir,
    }
    .run(plan, ctx)?;

    EmbedStager {
        build_dir: env.build_dir.clone(),
        mcu: env.mcu.clone(),
        hooks: &NoHooks,
    }
    .run(plan, ctx)
}
