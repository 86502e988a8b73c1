use clap::Parser;
use std::process::ExitCode;
use tracing::error;

pub mod array;
pub mod buffer;
pub mod config;
pub mod error;
pub mod logging;
pub mod marshal;
pub mod native;
pub mod object;
pub mod probe;
pub mod registry;
pub mod string;
pub mod types;

pub type GCHandle<'gc> = &'gc gc_arena::Mutation<'gc>;

pub use array::{Blittable, PodArrayMarshaler, Scalar, ValueArray};
pub use buffer::{NativeAllocator, NativeBuffer};
pub use error::{MarshalError, NativeLibraryError};
pub use object::{NativeIdentity, ObjArrayMarshaler, ObjectRef};
pub use registry::{InstanceRegistry, ManagedInstances};
pub use string::{CLRString, OwnershipMode, StringUtf8, StringUtf8Copy};

use config::AllocatorConfig;
use native::LibraryAllocator;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Check a native runtime's buffer allocator against the marshaling layer"
)]
pub struct Args {
    /// Native runtime library; falls back to INTEROP_RS_LIBRARY
    #[arg(short, long, value_name = "NAME")]
    pub library: Option<String>,
    #[arg(short, long, value_name = "FOLDER")]
    pub search_root: Option<String>,
    #[arg(long, value_name = "SYMBOL")]
    pub alloc_symbol: Option<String>,
    #[arg(long, value_name = "SYMBOL")]
    pub free_symbol: Option<String>,
    /// Text pushed through both string marshalers
    #[arg(default_value = "Hello from the managed side")]
    pub text: String,
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    fn allocator_config(&self) -> Option<AllocatorConfig> {
        let mut config = match &self.library {
            Some(library) => AllocatorConfig::new(library),
            None => AllocatorConfig::from_env()?,
        };
        if let Some(root) = &self.search_root {
            config.search_root = root.into();
        }
        if let Some(symbol) = &self.alloc_symbol {
            config.alloc_symbol = symbol.clone();
        }
        if let Some(symbol) = &self.free_symbol {
            config.free_symbol = symbol.clone();
        }
        Some(config)
    }
}

pub fn run_cli() -> ExitCode {
    let args = Args::parse();
    logging::init_logging(args.verbose);

    let Some(config) = args.allocator_config() else {
        eprintln!("no native library given: pass --library or set INTEROP_RS_LIBRARY");
        return ExitCode::from(2);
    };

    let allocator = match LibraryAllocator::load(&config) {
        Ok(a) => a,
        Err(e) => {
            error!(%e, "could not load native allocator");
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    let checks = probe::probe_allocator(&allocator, &args.text);
    for check in &checks {
        println!("{check}");
    }
    if checks.iter().all(probe::ProbeCheck::passed) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
