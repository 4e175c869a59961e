//! groupfs - interactive shell over a block-group filesystem image
//!
//! Opens (or creates) an image file, mounts the filesystem inside it, and
//! drops into a small REPL with the usual commands: ls, touch, mkdir, rm,
//! rmdir, write, read, format, mount, login, logout, whoami, exit.

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use groupfs::{BlockDevice, FileSystem, FsError, ListEntry};

/// Command-line interface definition
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = "Interactive shell over a persistent block-group filesystem stored in a single image file."
)]
struct Cli {
    /// Backing image file (created and grown to the requested size if needed)
    image: PathBuf,

    /// Image capacity in MiB
    #[arg(short, long, default_value_t = 16)]
    size_mib: u64,

    /// Format the image before entering the shell
    #[arg(long)]
    format: bool,
}

type ShellResult<T> = Result<T, Box<dyn Error>>;

enum ShellAction {
    Continue,
    Replace(FileSystem),
    Exit,
}

fn open_device(image: &Path, capacity: u64) -> Result<BlockDevice, FsError> {
    Ok(BlockDevice::open_file(image, capacity)?)
}

fn main() -> ShellResult<()> {
    env_logger::init();
    let cli = Cli::parse();
    let capacity = cli.size_mib * 1024 * 1024;

    let mut fs = if cli.format {
        FileSystem::format(open_device(&cli.image, capacity)?)?
    } else {
        match FileSystem::mount(open_device(&cli.image, capacity)?) {
            Ok(fs) => fs,
            Err(FsError::InvalidImage) => {
                println!("image is not formatted, formatting {}", cli.image.display());
                FileSystem::format(open_device(&cli.image, capacity)?)?
            }
            Err(e) => return Err(e.into()),
        }
    };

    println!("=== groupfs shell ===");
    println!("commands: ls, touch, mkdir, rm, rmdir, write, read, format, mount, login, logout, whoami, exit");

    let stdin = io::stdin();
    loop {
        print!("fs> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }

        match run_command(&mut fs, line, &cli.image, capacity) {
            Ok(ShellAction::Continue) => {}
            Ok(ShellAction::Replace(new_fs)) => fs = new_fs,
            Ok(ShellAction::Exit) => break,
            Err(e) => println!("[error] {e}"),
        }
    }

    fs.flush()?;
    Ok(())
}

fn run_command(
    fs: &mut FileSystem,
    line: &str,
    image: &Path,
    capacity: u64,
) -> ShellResult<ShellAction> {
    let args: Vec<&str> = line.split_whitespace().collect();
    let Some(&cmd) = args.first() else {
        return Ok(ShellAction::Continue);
    };

    match cmd {
        "exit" => return Ok(ShellAction::Exit),
        "format" => {
            fs.flush()?;
            let new_fs = FileSystem::format(open_device(image, capacity)?)?;
            return Ok(ShellAction::Replace(new_fs));
        }
        "mount" => {
            fs.flush()?;
            let new_fs = FileSystem::mount(open_device(image, capacity)?)?;
            return Ok(ShellAction::Replace(new_fs));
        }
        "ls" => {
            let path = args.get(1).copied().unwrap_or("/");
            let entries = fs.list_dir(path)?;
            if entries.is_empty() {
                println!("(empty)");
            }
            for entry in entries {
                println!("{}", render_entry(&entry));
            }
        }
        "touch" => fs.create_file(required_arg(&args, 1, "touch <path>")?)?,
        "mkdir" => fs.create_dir(required_arg(&args, 1, "mkdir <path>")?)?,
        "rm" => fs.delete_file(required_arg(&args, 1, "rm <path>")?)?,
        "rmdir" => fs.delete_dir(required_arg(&args, 1, "rmdir <path>")?)?,
        "write" => {
            let path = required_arg(&args, 1, "write <path> <content>")?;
            let content = content_after_path(line).unwrap_or("");
            fs.write_file(path, content.as_bytes())?;
        }
        "read" => {
            let path = required_arg(&args, 1, "read <path>")?;
            let data = fs.read_file(path)?;
            println!("{}", String::from_utf8_lossy(&data));
        }
        "login" => {
            let uid = parse_id(required_arg(&args, 1, "login <uid> <gid>")?)?;
            let gid = parse_id(required_arg(&args, 2, "login <uid> <gid>")?)?;
            fs.login(uid, gid);
        }
        "logout" => fs.logout(),
        "whoami" => println!("uid {}", fs.current_user()),
        _ => println!("unknown command: {cmd}"),
    }

    Ok(ShellAction::Continue)
}

fn required_arg<'a>(args: &[&'a str], index: usize, usage: &str) -> ShellResult<&'a str> {
    args.get(index)
        .copied()
        .ok_or_else(|| format!("usage: {usage}").into())
}

fn parse_id(text: &str) -> ShellResult<u16> {
    text.parse::<u16>()
        .map_err(|_| format!("not a valid id: {text}").into())
}

/// Everything after the second whitespace-separated token, verbatim, so
/// written content keeps its inner spaces.
fn content_after_path(line: &str) -> Option<&str> {
    let after_cmd = line.find(char::is_whitespace)?;
    let rest = line[after_cmd..].trim_start();
    let after_path = rest.find(char::is_whitespace)?;
    Some(rest[after_path..].trim_start())
}

/// Renders one listing row: `drwxr-xr-x uid gid name`.
fn render_entry(entry: &ListEntry) -> String {
    let mut mode = String::with_capacity(10);
    mode.push(if entry.is_directory { 'd' } else { '-' });
    for shift in [6, 3, 0] {
        let bits = (entry.permissions >> shift) & 0o7;
        mode.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        mode.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        mode.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    format!("{mode} {:>5} {:>5}  {}", entry.uid, entry.gid, entry.name)
}
