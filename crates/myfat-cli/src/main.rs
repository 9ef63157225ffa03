use anyhow::Result;
use clap::Parser;
use myfat_fs::fs::FormatOptions;
use myfat_fs::{FileBlockDevice, FileSystem, FsError};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about = "Interactive console for MYFATFS disk images", long_about = None)]
struct Cli {
    /// Disk image to mount at startup
    #[arg(short, long)]
    image: Option<PathBuf>,
}

struct Console {
    fs: Option<FileSystem<FileBlockDevice>>,
}

impl Console {
    fn mounted(&mut self) -> Result<&mut FileSystem<FileBlockDevice>, FsError> {
        self.fs.as_mut().ok_or(FsError::NotMounted)
    }

    fn format(&mut self, path: &Path) -> Result<(), FsError> {
        let options = FormatOptions::default();
        let mut device = FileBlockDevice::create(path, options.total_blocks)?;
        FileSystem::format(&mut device, &options)?;
        println!(
            "formatted '{}' ({} blocks of {} bytes)",
            path.display(),
            options.total_blocks,
            myfat_fs::BLOCK_SIZE
        );
        Ok(())
    }

    fn mount(&mut self, path: &Path) -> Result<(), FsError> {
        // a previously mounted image is released first
        if let Some(old) = self.fs.take() {
            old.unmount();
        }
        let device = FileBlockDevice::open(path)?;
        let fs = FileSystem::mount(device)?;
        println!("mounted '{}'", path.display());
        self.fs = Some(fs);
        Ok(())
    }

    fn unmount(&mut self) {
        match self.fs.take() {
            Some(fs) => {
                fs.unmount();
                println!("unmounted");
            }
            None => println!("nothing is mounted"),
        }
    }

    fn list(&mut self) -> Result<(), FsError> {
        let fs = self.mounted()?;
        let path = fs.current_path().to_string();
        let entries = fs.list_dir()?;
        println!("Contents of {}:", path);
        println!("{:<20} {:<6} {:>10} {}", "Name", "Type", "Size", "Modified");
        for e in &entries {
            let size = e.file_size;
            let modified = e.modified_time;
            println!(
                "{:<20} {:<6} {:>10} {}",
                e.name_as_str(),
                if e.is_dir() { "DIR" } else { "FILE" },
                size,
                modified
            );
        }
        Ok(())
    }

    fn read(&mut self, name: &str) -> Result<(), FsError> {
        let data = self.mounted()?.read_file(name)?;
        io::stdout().write_all(&data).map_err(FsError::Io)?;
        println!();
        Ok(())
    }

    fn dispatch(&mut self, line: &str) -> Result<(), FsError> {
        let (cmd, rest) = split_word(line);
        match cmd {
            "help" => {
                print_help();
                Ok(())
            }
            "format" => match one_arg(rest) {
                Some(path) => self.format(Path::new(path)),
                None => usage("format <path>"),
            },
            "mount" => match one_arg(rest) {
                Some(path) => self.mount(Path::new(path)),
                None => usage("mount <path>"),
            },
            "unmount" => {
                self.unmount();
                Ok(())
            }
            "ls" => self.list(),
            "mkdir" => match one_arg(rest) {
                Some(name) => {
                    self.mounted()?.make_dir(name)?;
                    println!("directory '{}' created", name);
                    Ok(())
                }
                None => usage("mkdir <name>"),
            },
            "rmdir" => match one_arg(rest) {
                Some(name) => {
                    self.mounted()?.remove_dir(name)?;
                    println!("directory '{}' removed", name);
                    Ok(())
                }
                None => usage("rmdir <name>"),
            },
            "cd" => match one_arg(rest) {
                Some(name) => self.mounted()?.change_dir(name),
                None => usage("cd <name>"),
            },
            "create" => match one_arg(rest) {
                Some(name) => {
                    self.mounted()?.create_file(name)?;
                    println!("file '{}' created", name);
                    Ok(())
                }
                None => usage("create <name>"),
            },
            "delete" => match one_arg(rest) {
                Some(name) => {
                    self.mounted()?.delete_file(name)?;
                    println!("file '{}' deleted", name);
                    Ok(())
                }
                None => usage("delete <name>"),
            },
            "read" => match one_arg(rest) {
                Some(name) => self.read(name),
                None => usage("read <name>"),
            },
            "write" => {
                let (name, data) = split_word(rest);
                if name.is_empty() || data.is_empty() {
                    return usage("write <name> <data>");
                }
                self.mounted()?.write_file(name, data.as_bytes())?;
                println!("wrote {} bytes to '{}'", data.len(), name);
                Ok(())
            }
            "truncate" => {
                let (name, size) = split_word(rest);
                match size.parse::<u32>() {
                    Ok(size) if !name.is_empty() => {
                        self.mounted()?.truncate_file(name, size)?;
                        println!("file '{}' truncated to {} bytes", name, size);
                        Ok(())
                    }
                    _ => usage("truncate <name> <size>"),
                }
            }
            _ => {
                println!("unknown command '{}'; type 'help' for commands", cmd);
                Ok(())
            }
        }
    }
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

fn one_arg(rest: &str) -> Option<&str> {
    let (arg, tail) = split_word(rest);
    if arg.is_empty() || !tail.is_empty() {
        None
    } else {
        Some(arg)
    }
}

fn usage(text: &str) -> Result<(), FsError> {
    println!("usage: {}", text);
    Ok(())
}

fn print_help() {
    println!("Available commands:");
    println!("  format <path>              create and format a new image");
    println!("  mount <path>               mount an existing image");
    println!("  unmount                    unmount the current image");
    println!("  ls                         list the current directory");
    println!("  cd <name>                  enter a subdirectory ('.' or '..' allowed)");
    println!("  mkdir <name>               create a subdirectory");
    println!("  rmdir <name>               remove an empty subdirectory");
    println!("  create <name>              create an empty file");
    println!("  write <name> <data>        overwrite a file with data");
    println!("  read <name>                print file contents");
    println!("  delete <name>              delete a file");
    println!("  truncate <name> <size>     shrink a file to size bytes");
    println!("  help                       show this message");
    println!("  exit                       quit");
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut console = Console { fs: None };
    if let Some(path) = cli.image.as_deref() {
        console.mount(path)?;
    }

    println!("MYFATFS console; type 'help' for commands");
    let mut line = String::new();
    loop {
        let prompt = console
            .fs
            .as_ref()
            .map(|fs| fs.current_path())
            .unwrap_or("-");
        print!("{}> ", prompt);
        io::stdout().flush()?;

        line.clear();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim_end_matches(['\n', '\r']);
        if input.trim().is_empty() {
            continue;
        }
        if input.trim() == "exit" {
            break;
        }
        if let Err(e) = console.dispatch(input) {
            println!("error: {}", e);
        }
    }

    if let Some(fs) = console.fs.take() {
        fs.unmount();
    }
    println!("Goodbye!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_word_separates_command_and_rest() {
        assert_eq!(split_word("write a.txt hello world"), ("write", "a.txt hello world"));
        assert_eq!(split_word("ls"), ("ls", ""));
        assert_eq!(split_word("  mount   img.fs  "), ("mount", "img.fs  "));
    }

    #[test]
    fn one_arg_rejects_extra_tokens() {
        assert_eq!(one_arg("img.fs"), Some("img.fs"));
        assert_eq!(one_arg(""), None);
        assert_eq!(one_arg("a b"), None);
    }
}
