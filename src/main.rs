use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;
use console::Term;
use miette::{bail, IntoDiagnostic, Result};

use braid::{assemble, Cpu, Device, Program, Status, DEFAULT_CYCLE_LIMIT, DEFAULT_ORIGIN};

/// Braid is an assembler and cycle-tracing emulator for the BR-16 teaching CPU.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.asm` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a text `.asm` or binary `.bin` file and output to terminal
    Run {
        /// `.asm` or `.bin` file to run
        name: PathBuf,
        /// Maximum retired instructions before giving up
        #[arg(short, long, default_value_t = DEFAULT_CYCLE_LIMIT)]
        limit: usize,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Create a flat binary `.bin` image to run later or inspect
    Compile {
        /// `.asm` file to compile
        name: PathBuf,
        /// Destination to output the .bin file
        dest: Option<PathBuf>,
        /// Also write a `.map` source map alongside the image
        #[arg(short, long)]
        map: bool,
    },
    /// Check a `.asm` file without running or outputting binary
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Run a `.asm` file and print its full execution trace
    Trace {
        /// `.asm` file to trace
        name: PathBuf,
        /// Maximum retired instructions before giving up
        #[arg(short, long, default_value_t = 10_000)]
        limit: usize,
    },
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .context_lines(braid::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    if let Some(command) = args.command {
        match command {
            Command::Run { name, limit, minimal } => run(&name, limit, minimal),
            Command::Compile { name, dest, map } => {
                file_message(Green, "Assembling", &name);
                let program = assemble_file(&name)?;

                let out_name = dest.unwrap_or_else(|| name.with_extension("bin"));
                let mut file = File::create(&out_name).into_diagnostic()?;
                file.write_all(&program.bytes).into_diagnostic()?;

                if map {
                    let map_name = out_name.with_extension("map");
                    fs::write(&map_name, render_map(&program)).into_diagnostic()?;
                    file_message(Green, "Saved", &map_name);
                }

                message(Green, "Finished", "emit binary");
                file_message(Green, "Saved", &out_name);
                Ok(())
            }
            Command::Check { name } => {
                file_message(Green, "Checking", &name);
                let _ = assemble_file(&name)?;
                message(Green, "Success", "no errors found!");
                Ok(())
            }
            Command::Trace { name, limit } => {
                file_message(Green, "Assembling", &name);
                let program = assemble_file(&name)?;
                let mut cpu = Cpu::from_program(&program)?;
                // Headless: no device wired, I/O reads come from memory
                let status = cpu.run(limit)?;
                print_trace(&cpu);
                message(Cyan, "Status", &status.to_string());
                Ok(())
            }
        }
    } else if let Some(path) = args.path {
        run(&path, DEFAULT_CYCLE_LIMIT, false)
    } else {
        println!("\n~ braid v{VERSION} ~");
        println!("{}", LOGO.truecolor(183, 201, 255).bold());
        println!("{SHORT_INFO}");
        std::process::exit(0);
    }
}

fn run(name: &PathBuf, limit: usize, minimal: bool) -> Result<()> {
    let mut cpu = match name.extension().and_then(|e| e.to_str()) {
        Some("bin" | "obj") => {
            // Read raw image to byte buffer, loaded at the default base
            let mut file = File::open(name).into_diagnostic()?;
            let mut buffer = Vec::new();
            file.read_to_end(&mut buffer).into_diagnostic()?;
            if buffer.len() % 2 != 0 {
                bail!("File is not aligned to 16 bits")
            }
            let mut cpu = Cpu::new();
            cpu.load_image(&buffer, DEFAULT_ORIGIN)?;
            cpu
        }
        Some("asm") => {
            if !minimal {
                file_message(MsgColor::Green, "Assembling", name);
            }
            let program = assemble_file(name)?;
            Cpu::from_program(&program)?
        }
        Some(_) => bail!("File has unknown extension. Exiting..."),
        None => bail!("File has no extension. Exiting..."),
    };

    cpu.set_device(Box::new(TermDevice::new()));

    if !minimal {
        message(MsgColor::Green, "Running", "emitted binary");
    }
    let status = cpu.run(limit)?;

    if !minimal {
        match status {
            Status::Halted { .. } => {
                println!("\n{:>12}", "Halted".cyan());
            }
            Status::Exhausted { .. } => {
                println!("\n{:>12}", "Exhausted".red());
            }
        }
        print_registers(&cpu);
        message(MsgColor::Cyan, "Status", &status.to_string());
    }
    Ok(())
}

fn assemble_file(name: &PathBuf) -> Result<Program> {
    let contents = fs::read_to_string(name).into_diagnostic()?;
    assemble(&contents)
}

/// Render the source map as aligned text, one row per non-empty line.
fn render_map(program: &Program) -> String {
    let mut out = String::new();
    for entry in &program.map {
        let addr = match entry.addr {
            Some(addr) => format!("{addr:04X}"),
            None => "    ".to_string(),
        };
        let bytes: String = entry
            .bytes
            .iter()
            .map(|b| format!("{b:02X} "))
            .collect::<String>()
            .trim_end()
            .to_string();
        out.push_str(&format!(
            "{:>4}  {}  {:<12}| {}\n",
            entry.line_no, addr, bytes, entry.text
        ));
    }
    out
}

fn print_registers(cpu: &Cpu) {
    println!("\n------ Registers ------");
    for (i, reg) in cpu.regs().iter().enumerate() {
        println!("r{i}: {reg:.>#19}");
    }
    println!("sp: {:.>#19}", cpu.sp());
    println!("pc: {:.>#19}", cpu.pc());
    println!("fl: {:.>19}", cpu.flags().to_string());
    println!("-----------------------");
}

fn print_trace(cpu: &Cpu) {
    let header = format!(
        "{:>6}  {:>4}  {:<24} {:<4}  {:>4}  {}",
        "cycle", "pc", "instr", "flag", "sp", "writes"
    );
    println!("{}", header.as_str().bold());
    for entry in cpu.trace() {
        let writes: String = entry
            .writes
            .iter()
            .map(|w| format!("[{:04X}]={:02X} ", w.addr, w.new))
            .collect();
        println!(
            "{:>6}  {:04X}  {:<24} {}  {:04X}  {}",
            entry.cycle,
            entry.pc,
            entry.instr.to_string(),
            entry.flags,
            entry.sp,
            writes.trim_end(),
        );
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &PathBuf) {
    let right = format!("target {}", right.to_str().unwrap());
    message(color, left, &right);
}

fn message(color: MsgColor, left: &str, right: &str) {
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

/// Default console-backed device: any write in the I/O segment prints its
/// byte as a character, any read takes one unbuffered character from the
/// terminal. Finer per-address mappings belong to embedding tools.
struct TermDevice {
    term: Term,
}

impl TermDevice {
    fn new() -> Self {
        TermDevice {
            term: Term::stdout(),
        }
    }
}

impl Device for TermDevice {
    fn on_write(&mut self, _addr: u16, val: u8) {
        print!("{}", val as char);
        let _ = std::io::stdout().flush();
    }

    fn on_read(&mut self, _addr: u16) -> Option<u8> {
        self.term.read_char().ok().map(|c| c as u8)
    }
}

const LOGO: &str = r#"
 |  _  ._ _. o  _|
 |_)| (_|| (_| |(_|
"#;

const SHORT_INFO: &str = r"
Welcome to braid, an assembler & cycle-tracing emulator
for the BR-16 teaching CPU.
Please use `-h` or `--help` to access the usage instructions.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
