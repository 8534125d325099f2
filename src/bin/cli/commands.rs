//! Command implementations for the CLI tool.

use std::path::Path;

use unrar_session::{
    EngineHandle, Error, ExtractOptions, ExtractResult, Password, extract_bytes, format,
    write_entries,
};

use crate::OutputFormat;
use crate::exit_codes::{ExitCode, error_to_exit_code};
use crate::output::create_formatter;
use crate::password;

/// Configuration for the extract command.
pub struct ExtractConfig<'a> {
    pub archive_path: &'a Path,
    pub output_dir: &'a Path,
    pub password: Option<String>,
    pub keep_going: bool,
    pub verify_size: bool,
    pub format: OutputFormat,
    pub quiet: bool,
}

/// Extract command implementation
pub fn extract(engine: &EngineHandle, config: &ExtractConfig<'_>) -> ExitCode {
    let formatter = create_formatter(config.format);

    let bytes = match read_archive(config.archive_path, config.quiet) {
        Ok(b) => b,
        Err(code) => return code,
    };

    let options = ExtractOptions::new()
        .stop_on_error(!config.keep_going)
        .verify_size(config.verify_size);

    let result = match run_with_prompt(
        engine,
        &bytes,
        options,
        password::from_args(config.password.clone()),
        config.archive_path,
    ) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return error_to_exit_code(&e);
        }
    };

    let summary = match write_entries(&result.entries, config.output_dir) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error writing to {}: {}", config.output_dir.display(), e);
            return error_to_exit_code(&e);
        }
    };

    if !config.quiet || config.format == OutputFormat::Json {
        print!("{}", formatter.format_extract_result(&result, &summary));
    }

    if result.is_ok() {
        ExitCode::Success
    } else {
        ExitCode::Warning
    }
}

/// List command implementation
pub fn list(
    engine: &EngineHandle,
    archive_path: &Path,
    password: Option<String>,
    format: OutputFormat,
    quiet: bool,
) -> ExitCode {
    let formatter = create_formatter(format);

    let bytes = match read_archive(archive_path, quiet) {
        Ok(b) => b,
        Err(code) => return code,
    };

    let result = match run_with_prompt(
        engine,
        &bytes,
        ExtractOptions::metadata_only(),
        password::from_args(password),
        archive_path,
    ) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return error_to_exit_code(&e);
        }
    };

    print!("{}", formatter.format_list(format::detect(&bytes), &result));

    if result.is_ok() {
        ExitCode::Success
    } else {
        ExitCode::Warning
    }
}

fn read_archive(path: &Path, quiet: bool) -> Result<Vec<u8>, ExitCode> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error opening {}: {}", path.display(), e);
            return Err(ExitCode::IoError);
        }
    };

    if !quiet {
        match format::find_signature(&bytes) {
            Some((0, _)) => {}
            Some((offset, found)) => {
                eprintln!("Note: {} archive starts at offset {}", found, offset)
            }
            None => eprintln!("Warning: {} has no RAR signature", path.display()),
        }
    }
    Ok(bytes)
}

/// Runs one extraction, prompting for a password once if the archive needs
/// one and none was given.
fn run_with_prompt(
    engine: &EngineHandle,
    bytes: &[u8],
    mut options: ExtractOptions,
    provided: Option<Password>,
    archive_path: &Path,
) -> unrar_session::Result<ExtractResult> {
    let had_password = provided.is_some();
    options.password = provided;

    let outcome = extract_bytes(engine, bytes, &options);
    if had_password || !needs_password(&outcome) {
        return outcome;
    }

    match password::prompt(&archive_path.display().to_string()) {
        Some(pwd) => {
            options.password = Some(pwd);
            extract_bytes(engine, bytes, &options)
        }
        None => outcome,
    }
}

fn needs_password(outcome: &Result<ExtractResult, Error>) -> bool {
    match outcome {
        Err(e) => e.is_decryption(),
        Ok(result) => result.failures.iter().any(|f| f.error.is_decryption()),
    }
}
