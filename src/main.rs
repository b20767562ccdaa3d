//! Backup Lane CLI
//!
//! Entry point for the `backup-lane` command-line tool.

use std::path::PathBuf;
use std::process;
use std::time::{Duration, SystemTime};

use clap::{Parser, Subcommand};
use uuid::Uuid;

use backup_lane::archiver::Archiver;
use backup_lane::destination::{self, DestinationDescriptor};
use backup_lane::janitor::Janitor;
use backup_lane::job::{ArchiveJob, BackupMode, BackupType};
use backup_lane::storage::{ObjectStorage, S3Gateway};
use backup_lane::store::FsContentStore;
use backup_lane::Config;

#[derive(Parser)]
#[command(name = "backup-lane")]
#[command(about = "Archive produced backup files to durable storage", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive one produced backup file
    Archive {
        /// Path to the produced archive (consumed on completion)
        #[arg(long)]
        source: PathBuf,

        /// Name to store the archive under (default: source file name)
        #[arg(long)]
        file_name: Option<String>,

        /// Job id (default: generated)
        #[arg(long)]
        job_id: Option<String>,

        /// Backup mode (general, import, hub, automated)
        #[arg(long, default_value = "general")]
        mode: BackupMode,

        /// Backup type (activity, section, course)
        #[arg(long = "type", default_value = "course")]
        kind: BackupType,

        /// The archive contains user data
        #[arg(long)]
        user_data: bool,

        /// The archive was anonymised
        #[arg(long)]
        anonymised: bool,

        /// Id of the user who requested the backup
        #[arg(long, default_value_t = 0)]
        owner_id: i64,

        /// Id of the activity/section the backup covers
        #[arg(long, default_value_t = 0)]
        container_id: i64,

        /// Id of the course the backup belongs to
        #[arg(long, default_value_t = 0)]
        course_id: i64,

        /// Export the stored archive to a directory or s3:// URL
        #[arg(long)]
        destination: Option<String>,

        /// Path to config file (default: built-in defaults)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,

        /// Print progress to stderr
        #[arg(long, short = 'v')]
        verbose: bool,
    },

    /// Remove stale entries from the scratch root
    Sweep {
        /// Remove entries last modified more than this many hours ago
        #[arg(long)]
        older_than_hours: u64,

        /// Scratch root to sweep (default: from config)
        #[arg(long)]
        scratch_root: Option<PathBuf>,

        /// Path to config file (default: built-in defaults)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show how a destination string is interpreted
    Resolve {
        /// Destination string (directory path, s3:// URL or empty)
        destination: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Archive {
            source,
            file_name,
            job_id,
            mode,
            kind,
            user_data,
            anonymised,
            owner_id,
            container_id,
            course_id,
            destination,
            config,
            json,
            verbose,
        } => {
            let job = ArchiveJob {
                job_id: job_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
                file_name: file_name.unwrap_or_else(|| {
                    source
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default()
                }),
                source_path: source,
                mode,
                kind,
                has_user_data: user_data,
                is_anonymised: anonymised,
                owner_id,
                container_id,
                course_id,
            };
            run_archive(job, destination, config, json, verbose);
        }
        Commands::Sweep {
            older_than_hours,
            scratch_root,
            config,
            json,
        } => {
            run_sweep(older_than_hours, scratch_root, config, json);
        }
        Commands::Resolve { destination, json } => {
            run_resolve(&destination, json);
        }
    }
}

fn load_config(config_path: Option<PathBuf>) -> Config {
    match config_path {
        Some(path) => match Config::from_file(&path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                process::exit(1);
            }
        },
        None => Config::default(),
    }
}

fn run_archive(
    job: ArchiveJob,
    destination: Option<String>,
    config_path: Option<PathBuf>,
    json: bool,
    verbose: bool,
) {
    let config = load_config(config_path);

    // Validate an explicit destination before any work happens.
    let export = destination.as_deref().map(|d| match destination::resolve(d) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            eprintln!("Invalid destination: {}", e);
            process::exit(20);
        }
    });

    let store = match FsContentStore::new(&config.content_store_root) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error opening content store: {}", e);
            process::exit(40);
        }
    };

    // Only connect to object storage when some route actually needs it.
    let needs_gateway = matches!(export, Some(DestinationDescriptor::ObjectStore { .. }))
        || (job.mode == BackupMode::Automated
            && config.storage_policy.uses_external()
            && destination::is_object_url(&config.external_destination));
    let gateway = if needs_gateway {
        if verbose {
            eprintln!("Connecting to object storage...");
        }
        match S3Gateway::connect() {
            Ok(g) => Some(g),
            Err(e) => {
                eprintln!("Error connecting to object storage: {}", e);
                process::exit(30);
            }
        }
    } else {
        None
    };

    // An explicit s3:// destination must point at an existing bucket
    // before any archiving work starts.
    if let (Some(DestinationDescriptor::ObjectStore { bucket, .. }), Some(g)) =
        (&export, gateway.as_ref())
    {
        match g.bucket_exists(bucket) {
            Ok(true) => {}
            Ok(false) => {
                eprintln!("Invalid destination: bucket does not exist: {}", bucket);
                process::exit(20);
            }
            Err(e) => {
                eprintln!("Error checking bucket {}: {}", bucket, e);
                process::exit(30);
            }
        }
    }

    let archiver = Archiver::new(
        &config,
        gateway.as_ref().map(|g| g as &dyn ObjectStorage),
        &store,
    );

    if verbose {
        eprintln!("Archiving {} ({} {})", job.file_name, job.mode, job.kind);
    }

    let outcome = match archiver.store_backup_file(&job) {
        Ok(outcome) => outcome,
        Err(failure) => {
            eprintln!("Archive failed: {}", failure.error);
            for warning in &failure.warnings {
                eprintln!("Warning: {}", warning);
            }
            process::exit(failure.exit_code());
        }
    };

    let mut warnings = outcome.warnings;
    let mut exported_to = None;

    if let (Some(handle), Some(descriptor)) = (outcome.handle.as_ref(), export) {
        match descriptor {
            DestinationDescriptor::ObjectStore { bucket, prefix } => {
                if verbose {
                    eprintln!("Exporting to s3://{}/{}...", bucket, prefix);
                }
                // An object-store export was asked for explicitly, so a
                // failed upload is a hard error.
                if let Err(e) = archiver.export_to_object_store(&job, handle, &bucket, &prefix) {
                    eprintln!("Export failed: {}", e);
                    process::exit(e.exit_code());
                }
                exported_to = Some(format!("s3://{}/{}{}", bucket, prefix, handle.address.file_name));
            }
            DestinationDescriptor::Local { directory } => {
                if verbose {
                    eprintln!("Copying to {}...", directory.display());
                }
                match archiver.export_to_dir(handle, &directory, &mut warnings) {
                    Ok(true) => {
                        exported_to =
                            Some(directory.join(&handle.address.file_name).display().to_string());
                    }
                    Ok(false) => {
                        // The stored copy stays as the fallback.
                        warnings.push(format!(
                            "could not copy to {}, archive kept in content store",
                            directory.display()
                        ));
                    }
                    Err(e) => {
                        eprintln!("Export failed: {}", e);
                        process::exit(e.exit_code());
                    }
                }
            }
            DestinationDescriptor::ContentStore => {}
        }
    }

    for warning in &warnings {
        eprintln!("Warning: {}", warning);
    }

    if json {
        let output = serde_json::json!({
            "job_id": job.job_id,
            "handle": outcome.handle,
            "exported_to": exported_to,
            "warnings": warnings,
        });
        match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
    } else {
        match (&outcome.handle, &exported_to) {
            (Some(handle), Some(dest)) => {
                println!("Archived {} ({} bytes) to {}", handle.address.file_name, handle.size, dest);
            }
            (Some(handle), None) => {
                println!(
                    "Archived {} ({} bytes) to content store as {}",
                    handle.address.file_name, handle.size, handle.content_sha256
                );
            }
            (None, _) => {
                println!("Archived {} to external storage", job.file_name);
            }
        }
    }
}

fn run_sweep(
    older_than_hours: u64,
    scratch_root: Option<PathBuf>,
    config_path: Option<PathBuf>,
    json: bool,
) {
    let config = load_config(config_path);
    let root = scratch_root.unwrap_or(config.scratch_root);
    let janitor = Janitor::new(&root, config.dir_mask);
    let cutoff = SystemTime::now() - Duration::from_secs(older_than_hours * 3600);

    match janitor.sweep_older_than(cutoff) {
        Ok(report) => {
            if json {
                match serde_json::to_string_pretty(&report) {
                    Ok(text) => println!("{}", text),
                    Err(e) => {
                        eprintln!("Error serializing output: {}", e);
                        process::exit(1);
                    }
                }
            } else {
                println!(
                    "Removed {} directories and {} files from {}",
                    report.removed_dirs,
                    report.removed_files,
                    root.display()
                );
            }
        }
        Err(e) => {
            eprintln!("Sweep failed: {}", e);
            process::exit(50);
        }
    }
}

fn run_resolve(destination: &str, json: bool) {
    let descriptor = match destination::resolve(destination) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Invalid destination: {}", e);
            process::exit(20);
        }
    };

    if json {
        match serde_json::to_string_pretty(&descriptor) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
    } else {
        match descriptor {
            DestinationDescriptor::ContentStore => println!("Content store (no external copy)"),
            DestinationDescriptor::Local { directory } => {
                println!("Local directory: {}", directory.display())
            }
            DestinationDescriptor::ObjectStore { bucket, prefix } => {
                println!("Object storage bucket: {}", bucket);
                if prefix.is_empty() {
                    println!("Key prefix: (none)");
                } else {
                    println!("Key prefix: {}", prefix);
                }
            }
        }
    }
}
