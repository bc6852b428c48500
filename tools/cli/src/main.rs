//! SecureVault CLI - Command line interface for file encryption and secure wipe.
//!
//! This tool encrypts and decrypts files under a password or a key file,
//! and securely erases files, directories and volumes.

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use securevault_common::config::{Settings, CONFIG_FILENAME};
use securevault_common::SensitiveBytes;
use securevault_crypto::entropy::perplexity;
use securevault_crypto::{
    decrypt_file_with_key, decrypt_file_with_password, encrypt_file_with_key,
    encrypt_file_with_password, load_key_file, read_header, save_key_file, CipherMethod, Key,
};
use securevault_wipe::{WipeEngine, WipeJob, WipeMethod, WipeObserver, WipeOutcome, WipeTarget};

/// Bytes sampled by `inspect` for the entropy estimate.
const INSPECT_SAMPLE: u64 = 1024 * 1024;

#[derive(Parser)]
#[command(name = "securevault")]
#[command(about = "SecureVault - File encryption and secure erase")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Settings file (default: <config dir>/securevault/config.json).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Also append log output to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a file.
    Encrypt {
        /// File to encrypt.
        input: PathBuf,

        /// Output file (default: <input>.enc).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Cipher: Fernet, AES-128, AES-192, AES-256 or AES-256-GCM.
        #[arg(short, long, default_value = "Fernet")]
        method: String,

        /// Encrypt with a key file instead of a password (no header is written).
        #[arg(short, long)]
        key_file: Option<PathBuf>,
    },

    /// Decrypt a file.
    Decrypt {
        /// File to decrypt.
        input: PathBuf,

        /// Output file (default: <input> without .enc, or <input>.dec).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Cipher used with --key-file; password files record it in the header.
        #[arg(short, long, default_value = "Fernet")]
        method: String,

        /// Decrypt with a key file instead of a password.
        #[arg(short, long)]
        key_file: Option<PathBuf>,
    },

    /// Generate a random key file.
    Keygen {
        /// Where to write the key.
        output: PathBuf,

        /// Cipher the key is for.
        #[arg(short, long, default_value = "Fernet")]
        method: String,
    },

    /// Securely wipe a file, directory or volume.
    Wipe {
        /// Target path.
        target: PathBuf,

        /// Wipe method name (see `securevault methods`).
        #[arg(short, long, default_value = "Zero Fill (1 Pass)")]
        method: String,

        /// Overwrite only; do not delete afterwards.
        #[arg(long)]
        keep: bool,

        /// Read every file back after the final zero pass.
        #[arg(long)]
        verify: bool,

        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,
    },

    /// List cipher and wipe methods.
    Methods,

    /// Show the header and entropy of a file.
    Inspect {
        /// File to inspect.
        path: PathBuf,
    },

    /// Print shell completions.
    Completions {
        /// Shell to generate for.
        shell: Shell,
    },
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    use std::sync::Mutex;
    use tracing_subscriber::{
        filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
    };

    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let file_layer = match log_file {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(open_log_file(path)?)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(level)
        .with(fmt::layer().with_target(false).compact())
        .with(file_layer)
        .try_init()?;
    Ok(())
}

/// Open `path` for appending, creating it if needed.
fn open_log_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_file.as_deref())?;

    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Commands::Encrypt {
            input,
            output,
            method,
            key_file,
        } => {
            let output = output.unwrap_or_else(|| default_encrypted_path(&input));
            cmd_encrypt(settings, input, output, &method, key_file).await
        }

        Commands::Decrypt {
            input,
            output,
            method,
            key_file,
        } => {
            let output = output.unwrap_or_else(|| default_decrypted_path(&input));
            cmd_decrypt(input, output, &method, key_file).await
        }

        Commands::Keygen { output, method } => cmd_keygen(&output, &method),

        Commands::Wipe {
            target,
            method,
            keep,
            verify,
            yes,
        } => cmd_wipe(settings, &target, &method, !keep, verify, yes).await,

        Commands::Methods => {
            cmd_methods();
            Ok(())
        }

        Commands::Inspect { path } => cmd_inspect(&path),

        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "securevault", &mut io::stdout());
            Ok(())
        }
    }
}

/// Load settings from `--config`, the per-user config file, or defaults.
fn load_settings(path: Option<&Path>) -> Result<Settings> {
    if let Some(path) = path {
        return Settings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()));
    }

    match dirs::config_dir() {
        Some(dir) => {
            let path = dir.join("securevault").join(CONFIG_FILENAME);
            Settings::load_or_default(&path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))
        }
        None => Ok(Settings::default()),
    }
}

fn default_encrypted_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".enc");
    PathBuf::from(name)
}

fn default_decrypted_path(input: &Path) -> PathBuf {
    if input.extension().is_some_and(|ext| ext == "enc") {
        input.with_extension("")
    } else {
        let mut name = input.as_os_str().to_owned();
        name.push(".dec");
        PathBuf::from(name)
    }
}

/// Prompt for password securely.
fn prompt_password(prompt: &str) -> Result<SensitiveBytes> {
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(SensitiveBytes::from(password))
}

fn parse_method(name: &str) -> Result<CipherMethod> {
    name.parse::<CipherMethod>()
        .with_context(|| format!("Invalid method '{}'", name))
}

fn make_progress_bar(total: u64, prefix: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
        )?
        .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

/// Encrypt a file.
async fn cmd_encrypt(
    settings: Settings,
    input: PathBuf,
    output: PathBuf,
    method: &str,
    key_file: Option<PathBuf>,
) -> Result<()> {
    let method = parse_method(method)?;
    let total = std::fs::metadata(&input)
        .with_context(|| format!("Cannot read {}", input.display()))?
        .len();

    let secret = match &key_file {
        Some(path) => Secret::Key(load_key_file(path).context("Failed to load key file")?),
        None => {
            let password = prompt_password("Enter password: ")?;
            let confirm = prompt_password("Confirm password: ")?;
            if password.as_bytes() != confirm.as_bytes() {
                bail!("Passwords do not match");
            }
            if password.is_empty() {
                bail!("Password cannot be empty");
            }
            Secret::Password(password)
        }
    };

    let pb = make_progress_bar(total, "encrypt")?;
    let bar = pb.clone();
    let (source, dest) = (input.clone(), output.clone());
    tokio::task::spawn_blocking(move || {
        let observer = move |processed: u64, _total: u64| bar.set_position(processed);
        match secret {
            Secret::Password(password) => encrypt_file_with_password(
                password.as_bytes(),
                method,
                &source,
                &dest,
                &settings.stream,
                &observer,
            ),
            Secret::Key(key) => {
                encrypt_file_with_key(&key, method, &source, &dest, &settings.stream, &observer)
            }
        }
    })
    .await
    .context("Encryption task panicked")?
    .context("Encryption failed")?;
    pb.finish_and_clear();

    println!("Encrypted with {}: {}", method, output.display());
    if key_file.is_some() {
        println!("  Decrypt with: securevault decrypt --key-file <key> --method {}", method);
    }
    Ok(())
}

/// Decrypt a file.
async fn cmd_decrypt(
    input: PathBuf,
    output: PathBuf,
    method: &str,
    key_file: Option<PathBuf>,
) -> Result<()> {
    let method = parse_method(method)?;
    let total = std::fs::metadata(&input)
        .with_context(|| format!("Cannot read {}", input.display()))?
        .len();

    let secret = match &key_file {
        Some(path) => Secret::Key(load_key_file(path).context("Failed to load key file")?),
        None => {
            // Fail on foreign files before asking for a password.
            let file = File::open(&input)?;
            read_header(io::BufReader::new(file)).context("Not a password-encrypted file")?;
            Secret::Password(prompt_password("Enter password: ")?)
        }
    };

    let pb = make_progress_bar(total, "decrypt")?;
    let bar = pb.clone();
    let (source, dest) = (input.clone(), output.clone());
    let used = tokio::task::spawn_blocking(move || {
        let observer = move |processed: u64, _total: u64| bar.set_position(processed);
        match secret {
            Secret::Password(password) => {
                decrypt_file_with_password(password.as_bytes(), &source, &dest, &observer)
            }
            Secret::Key(key) => {
                decrypt_file_with_key(&key, method, &source, &dest, &observer).map(|_| method)
            }
        }
    })
    .await
    .context("Decryption task panicked")?;
    pb.finish_and_clear();

    let used = match used {
        Ok(method) => method,
        Err(e) if e.is_authentication_failure() => {
            bail!("Decryption failed: wrong password/key or the file was modified")
        }
        Err(e) => return Err(e).context("Decryption failed"),
    };

    println!("Decrypted ({}): {}", used, output.display());
    Ok(())
}

enum Secret {
    Password(SensitiveBytes),
    Key(Key),
}

/// Generate a key file.
fn cmd_keygen(output: &Path, method: &str) -> Result<()> {
    let method = parse_method(method)?;
    if output.exists() {
        bail!("{} already exists", output.display());
    }

    let key = Key::generate(method);
    save_key_file(output, &key, method).context("Failed to write key file")?;

    info!("Generated {} key", method);
    println!("Key written to {} ({} bytes, {})", output.display(), key.len(), method);
    Ok(())
}

/// Progress bar driven by wipe pass events.
struct WipeProgress {
    pb: ProgressBar,
}

impl WipeObserver for WipeProgress {
    fn on_estimate(&self, total_bytes: u64, total_passes: usize, file_count: usize) {
        self.pb.set_length(total_passes as u64);
        self.pb.set_message(format!(
            "{} files, {} bytes",
            file_count, total_bytes
        ));
    }

    fn on_pass(&self, pass: usize, _total_passes: usize) {
        self.pb.set_position(pass as u64);
    }
}

/// Securely wipe a target.
async fn cmd_wipe(
    settings: Settings,
    target: &Path,
    method: &str,
    delete_after: bool,
    verify: bool,
    yes: bool,
) -> Result<()> {
    let method = WipeMethod::find(method).context("Invalid wipe method")?;
    let resolved = WipeTarget::resolve(target).context("Cannot wipe target")?;

    if !yes {
        let action = if delete_after && resolved.is_deletable() {
            "overwrite and delete"
        } else {
            "overwrite"
        };
        print!(
            "This will {} {} ({} files) with {}. Type 'yes' to continue: ",
            action,
            target.display(),
            resolved.files().len(),
            method.name()
        );
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        if answer.trim() != "yes" {
            println!("Aborted.");
            return Ok(());
        }
    }

    let passes = method.passes();
    let removes_target = delete_after && resolved.is_deletable();
    let job = WipeJob::new(resolved, method)
        .with_delete_after(delete_after)
        .with_verify(verify);
    let (engine, handle) = WipeEngine::new(job, settings.wipe);

    let pb = ProgressBar::new(passes as u64);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] pass {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    pb.set_prefix("wipe");
    pb.enable_steady_tick(Duration::from_millis(100));

    let cancel = handle.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            if cancel.cancel() {
                warn!("Interrupted; cancelling wipe");
            } else {
                warn!("Interrupted while deleting; finishing wipe");
            }
        }
    });

    let observer = WipeProgress { pb: pb.clone() };
    let report = tokio::task::spawn_blocking(move || engine.run(&observer))
        .await
        .context("Wipe task panicked")?
        .context("Wipe failed")?;
    interrupt.abort();
    pb.finish_and_clear();

    match report.outcome {
        WipeOutcome::Completed => {
            println!(
                "Wiped {} ({} files, {} bytes, {} passes + zero pass)",
                target.display(),
                report.files,
                report.bytes,
                report.passes_completed
            );
            if report.verified {
                println!("  Verified: all bytes read back as zero");
            }
            if report.deleted {
                println!("  Deleted");
            } else if removes_target {
                println!("  Kept {}: it holds entries that were skipped", target.display());
            }
        }
        WipeOutcome::Cancelled => {
            println!(
                "Wipe cancelled after {} of {} passes; nothing was deleted",
                report.passes_completed, passes
            );
        }
    }
    Ok(())
}

/// List available methods.
fn cmd_methods() {
    println!("Encryption methods:");
    for method in CipherMethod::ALL {
        let integrity = if method.is_authenticated() {
            "authenticated"
        } else {
            "no integrity check"
        };
        println!(
            "  {:<12} {}-byte key, {}",
            method.name(),
            method.key_length(),
            integrity
        );
    }

    println!("\nWipe methods:");
    for method in WipeMethod::all() {
        println!("  {}", method.name());
    }
}

/// Show what a file looks like.
fn cmd_inspect(path: &Path) -> Result<()> {
    let size = std::fs::metadata(path)
        .with_context(|| format!("Cannot read {}", path.display()))?
        .len();

    println!("File: {}", path.display());
    println!("  Size: {} bytes", size);

    match read_header(File::open(path)?) {
        Ok(header) => {
            println!("  Format: password-encrypted");
            println!("  Method: {}", header.method);
        }
        Err(_) => println!("  Format: no password header (plaintext or key-file stream)"),
    }

    let mut sample = Vec::new();
    File::open(path)?
        .take(INSPECT_SAMPLE)
        .read_to_end(&mut sample)?;
    let score = perplexity(&sample);
    println!("  Perplexity: {:.1} / 256", score);
    if score > 250.0 {
        println!("  Content looks encrypted or compressed");
    }
    Ok(())
}
