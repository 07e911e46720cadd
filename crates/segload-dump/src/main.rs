use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, LevelFilter, Log, Metadata, Record};

use kernel::config::{LoaderConfig, DEFAULT_USER_STACK_SIZE, NUM_USER_LDT_ENTRIES};
use kernel::hal::{DescriptorHandle, DescriptorTable, Interrupts, Platform};
use kernel::segment::Descriptor;
use kernel::load_user_program;
use segload_format::{ExecutableFormat, SegmentDescriptor};

#[derive(Parser)]
#[command(author, version, about = "Display executable segments and dry-run the user load", long_about = None)]
struct Args {
    file: String,
    /// Command line placed in the argument block (defaults to the file name)
    #[arg(short, long)]
    command: Option<String>,
    #[arg(long, default_value_t = DEFAULT_USER_STACK_SIZE)]
    stack_size: u32,
    /// Only print the parsed header and segments
    #[arg(long)]
    no_load: bool,
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:5}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

/// Hosted stand-in for the descriptor table: hands out GDT slots from a
/// counter and remembers what was installed.
struct HostPlatform {
    next_slot: u16,
    installed: Vec<(u16, Descriptor, Vec<Descriptor>)>,
    interrupts: bool,
}

impl HostPlatform {
    fn new() -> Self {
        Self { next_slot: 6, installed: Vec::new(), interrupts: false }
    }
}

impl DescriptorTable for HostPlatform {
    fn allocate_descriptor(&mut self) -> Option<DescriptorHandle> {
        let slot = self.next_slot;
        self.next_slot = self.next_slot.checked_add(1)?;
        Some(DescriptorHandle(slot))
    }

    fn install_ldt(&mut self, handle: DescriptorHandle, ldt: &[Descriptor]) {
        let system = Descriptor::ldt(ldt.as_ptr() as usize as u32, ldt.len());
        self.installed.push((handle.index(), system, ldt.to_vec()));
    }

    fn free_descriptor(&mut self, handle: DescriptorHandle) {
        debug!("freed descriptor slot {}", handle.index());
        self.installed.retain(|(slot, _, _)| *slot != handle.index());
    }
}

impl Interrupts for HostPlatform {
    fn interrupts_enabled(&self) -> bool {
        self.interrupts
    }

    fn enable_interrupts(&mut self) {
        self.interrupts = true;
    }

    fn disable_interrupts(&mut self) {
        self.interrupts = false;
    }
}

impl Platform for HostPlatform {
    fn activate_protection_domain(&mut self, ldt_selector: u16) {
        debug!("lldt {:#06x}", ldt_selector);
    }
}

fn flags_str(seg: &SegmentDescriptor) -> String {
    let mut s = String::with_capacity(3);
    s.push(if seg.is_readable() { 'r' } else { '-' });
    s.push(if seg.is_writable() { 'w' } else { '-' });
    s.push(if seg.is_executable() { 'x' } else { '-' });
    s
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let data = std::fs::read(&args.file).with_context(|| format!("reading {}", args.file))?;
    let exe = ExecutableFormat::parse(&data).with_context(|| format!("parsing {}", args.file))?;

    println!("Entry   : {:#010x}", exe.entry_addr);
    println!("Segments: {}", exe.num_segments);
    for (i, seg) in exe.segments().iter().enumerate() {
        println!(
            "  [{}] {} vaddr={:#010x} memsz={:#x} fileoff={:#x} filesz={:#x}",
            i,
            flags_str(seg),
            seg.start_address,
            seg.size_in_memory,
            seg.offset_in_file,
            seg.length_in_file
        );
    }
    if args.no_load {
        return Ok(());
    }

    let command = args.command.as_deref().unwrap_or(&args.file);
    let config = LoaderConfig { user_stack_size: args.stack_size };
    let mut platform = HostPlatform::new();
    let space = load_user_program(&mut platform, &data, &exe, command, &config)
        .with_context(|| format!("loading {}", args.file))?;

    println!("Load    : size={:#x} entry={:#010x} args={:#010x} sp={:#010x}",
        space.size(), space.entry_addr(), space.arg_block_addr(), space.stack_pointer_addr());
    println!("Select  : ldt={:#06x} cs={:#06x} ds={:#06x}",
        space.ldt_selector(), space.cs_selector(), space.ds_selector());
    for (slot, system, ldt) in &platform.installed {
        debug_assert_eq!(ldt.len(), NUM_USER_LDT_ENTRIES);
        println!("  gdt[{}] {:#018x} ldt limit={:#x}", slot, system.0, system.limit());
        for (i, d) in ldt.iter().enumerate() {
            println!("  ldt[{}] {:#018x} type={:#x} dpl={} span={:#x}",
                i, d.0, d.segment_type(), d.dpl(), d.span());
        }
    }

    space.activate(&mut platform);
    space.destroy(&mut platform);
    Ok(())
}
