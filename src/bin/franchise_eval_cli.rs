use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use franchise_eval::{
    analysis::{AnalysisProgress, AnalysisRequest, AnalysisService},
    config, logging,
    evaluation::ClaudeModel,
    extraction::{ACCEPTED_EXTENSIONS, DocumentFormat, UploadedDocument, decode_text},
    rubric::framework_for_display,
    session::{ExportFormat, SessionContext, export, today},
};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "franchise-eval-cli",
    about = "Evaluate franchise proposal documents against a scoring rubric"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the evaluation framework dimensions and criteria.
    Framework,
    /// Print the assembled evaluation prompt without calling the service.
    Prompt {
        /// Files or directories to evaluate.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Rubric file replacing the default heuristics model.
        #[arg(long)]
        rubric: Option<PathBuf>,
    },
    /// Run one evaluation and print or save the result.
    Analyze {
        /// Files or directories to evaluate.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Rubric file replacing the default heuristics model.
        #[arg(long)]
        rubric: Option<PathBuf>,
        /// Model identifier; defaults to EVALUATION_MODEL or the built-in default.
        #[arg(long)]
        model: Option<ClaudeModel>,
        /// Directory to write the dated evaluation file into; stdout when omitted.
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Export format for the saved file.
        #[arg(long, default_value = "txt")]
        format: ExportFormat,
    },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing();
    let config = config::init_config().context("failed to load configuration")?;

    match cli.command {
        Command::Framework => {
            let (framework, warning) = framework_for_display(config.rubric_path.as_deref());
            if let Some(warning) = warning {
                eprintln!("warning: {warning}");
            }
            for (index, dimension) in framework.dimensions.iter().enumerate() {
                println!("{}. {}", index + 1, dimension.name);
                for criterion in &dimension.criteria {
                    println!("   - {criterion}");
                }
            }
        }
        Command::Prompt { paths, rubric } => {
            let documents = collect_documents(&paths)?;
            let rubric = rubric.as_deref().map(read_rubric).transpose()?;
            let service = AnalysisService::from_config(config)?;
            let preview =
                service.preview_prompt(&documents, rubric.as_deref(), &mut report_progress);
            if let Some(warning) = preview.rubric_warning {
                eprintln!("warning: {warning}");
            }
            print!("{}", preview.prompt);
        }
        Command::Analyze {
            paths,
            rubric,
            model,
            output_dir,
            format,
        } => {
            let documents = collect_documents(&paths)?;
            let rubric_override = rubric.as_deref().map(read_rubric).transpose()?;
            let service = AnalysisService::from_config(config)?;

            let mut session = SessionContext::new();
            let outcome = service
                .analyze_into(
                    &mut session,
                    AnalysisRequest {
                        documents,
                        rubric_override,
                        model,
                    },
                    &mut report_progress,
                )
                .await?;
            if let Some(warning) = &outcome.rubric_warning {
                eprintln!("warning: {warning}");
            }

            let Some(file) = export(&session, format, today()) else {
                bail!("analysis finished without a stored result");
            };
            match output_dir {
                Some(dir) => {
                    fs::create_dir_all(&dir)
                        .with_context(|| format!("failed to create {}", dir.display()))?;
                    let path = dir.join(&file.file_name);
                    fs::write(&path, file.body.as_bytes())
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    eprintln!("Saved evaluation to {}", path.display());
                }
                None => println!("{}", file.body),
            }
        }
    }
    Ok(())
}

fn report_progress(event: AnalysisProgress) {
    match event {
        AnalysisProgress::Stage(stage) => {
            eprintln!("[{:>3}%] {}", stage.percent(), stage.message());
        }
        AnalysisProgress::Document(progress) => {
            let suffix = if progress.failed {
                " (could not extract text)"
            } else {
                ""
            };
            eprintln!(
                "  processed {}/{}: {}{suffix}",
                progress.index + 1,
                progress.total,
                progress.name
            );
        }
    }
}

/// Expand directories (sorted, accepted extensions only) and read every file.
///
/// Files found under a directory are named by their path relative to it. Names that would
/// still collide fall back to the full path so no document replaces another.
fn collect_documents(paths: &[PathBuf]) -> Result<Vec<UploadedDocument>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry =
                    entry.with_context(|| format!("failed to walk {}", path.display()))?;
                if entry.file_type().is_file() && is_accepted(entry.path()) {
                    let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
                    let name = slash_path(relative);
                    files.push((entry.into_path(), name));
                }
            }
        } else {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| slash_path(path));
            files.push((path.clone(), name));
        }
    }
    if files.is_empty() {
        bail!(
            "no documents found; accepted extensions: {}",
            ACCEPTED_EXTENSIONS.join(", ")
        );
    }

    let mut uses: HashMap<String, usize> = HashMap::new();
    for (_, name) in &files {
        *uses.entry(name.clone()).or_default() += 1;
    }

    files
        .into_iter()
        .map(|(file, name)| {
            let bytes =
                fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let name = if uses.get(&name).copied().unwrap_or_default() > 1 {
                slash_path(&file)
            } else {
                name
            };
            Ok(UploadedDocument::new(name, bytes))
        })
        .collect()
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_accepted(path: &Path) -> bool {
    let name = path.file_name().map(|name| name.to_string_lossy());
    name.is_some_and(|name| !matches!(DocumentFormat::from_name(&name), DocumentFormat::Unsupported(_)))
}

fn read_rubric(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read rubric {}", path.display()))?;
    Ok(decode_text(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(documents: &[UploadedDocument]) -> Vec<&str> {
        documents.iter().map(|doc| doc.name.as_str()).collect()
    }

    #[test]
    fn same_file_name_in_sibling_directories_stays_distinct() {
        let root = tempfile::tempdir().expect("temp dir");
        for dir in ["franchise", "operations"] {
            fs::create_dir(root.path().join(dir)).expect("mkdir");
            fs::write(root.path().join(dir).join("notes.txt"), dir).expect("write");
        }
        fs::write(root.path().join("logo.png"), b"png").expect("write");

        let documents = collect_documents(&[root.path().to_path_buf()]).expect("collect");
        assert_eq!(names(&documents), ["franchise/notes.txt", "operations/notes.txt"]);
        assert_eq!(documents[1].raw_bytes, b"operations");
    }

    #[test]
    fn colliding_names_across_inputs_use_full_paths() {
        let first = tempfile::tempdir().expect("temp dir");
        let second = tempfile::tempdir().expect("temp dir");
        for dir in [&first, &second] {
            fs::write(dir.path().join("summary.md"), "# Summary").expect("write");
        }

        let documents =
            collect_documents(&[first.path().to_path_buf(), second.path().join("summary.md")])
                .expect("collect");
        assert_eq!(documents.len(), 2);
        assert_ne!(documents[0].name, documents[1].name);
        assert!(documents.iter().all(|doc| doc.name.ends_with("/summary.md")));
    }

    #[test]
    fn explicit_file_keeps_its_file_name() {
        let dir = tempfile::tempdir().expect("temp dir");
        let file = dir.path().join("pitch.pdf");
        fs::write(&file, b"%PDF").expect("write");
        let documents = collect_documents(&[file]).expect("collect");
        assert_eq!(names(&documents), ["pitch.pdf"]);
    }
}
