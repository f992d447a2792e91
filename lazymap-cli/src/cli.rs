//! Command line definition and the sort workload.
//!
//! The benchmark maps a file, fills it with pseudo-random words, heap-sorts
//! the words in place through the paged region, unmaps it, then maps the
//! file again and checks that the words come back sorted.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;
use lazymap::domain::{PagerConfig, RegionLayout};
use lazymap::{FileStore, Region, SoftMmu};

/// Where the region is placed in the simulated address space.
const REGION_BASE: u64 = 0x7f00_0000_0000;

const WORD: u64 = 8;

#[derive(Parser, Debug)]
#[command(name = "lazymap-sort")]
#[command(about = "Sort a file of 64-bit words through a demand-paged region", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Backing file (a temporary file is used when omitted)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Size of the region in pages
    #[arg(short, long, default_value_t = 1024)]
    pub pages: u64,

    /// Page size in bytes
    #[arg(long, default_value_t = 4096)]
    pub page_size: usize,

    /// Page buffer capacity in pages
    #[arg(short, long, default_value_t = 64)]
    pub buffer_pages: usize,

    /// Number of flusher threads
    #[arg(long, default_value_t = 4)]
    pub flushers: usize,

    /// Number of fault-servicing (page filler) threads
    #[arg(long, default_value_t = 2)]
    pub fillers: usize,

    /// Open the file with O_DIRECT
    #[arg(long)]
    pub direct: bool,

    /// Keep the backing file after the run
    #[arg(long, requires = "file")]
    pub keep: bool,
}

impl Cli {
    fn config(&self) -> PagerConfig {
        PagerConfig::new()
            .with_page_size(self.page_size)
            .with_buffer_pages(self.buffer_pages)
            .with_flusher_workers(self.flushers)
            .with_fault_workers(self.fillers)
    }

    fn layout(&self) -> Result<RegionLayout> {
        let len = self
            .pages
            .checked_mul(self.page_size as u64)
            .context("Region size overflows")?;
        Ok(RegionLayout::new(REGION_BASE, len, self.page_size)?)
    }
}

/// Run the benchmark.
pub fn run(cli: Cli) -> Result<()> {
    let config = cli.config();
    config.validate()?;
    let layout = cli.layout()?;
    let words = layout.len() / WORD;

    // The temporary directory lives until the end of the run.
    let (path, _temp) = match &cli.file {
        Some(file) => (file.clone(), None),
        None => {
            let dir = tempfile::Builder::new().prefix("lazymap-sort-").tempdir()?;
            (dir.path().join("sort.bin"), Some(dir))
        }
    };

    println!(
        "{}: {} pages of {} bytes, buffer of {} pages, {} flushers, {} fillers",
        path.display(),
        cli.pages,
        cli.page_size,
        cli.buffer_pages,
        cli.flushers,
        cli.fillers
    );

    // Fill and sort.
    {
        let store = Arc::new(
            FileStore::create(&path, layout.len(), cli.direct)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        );
        let mmu = Arc::new(SoftMmu::new(layout));
        let region = Region::map(store, mmu.clone(), layout, config)?;

        let started = Instant::now();
        fill(&mmu, words, cli.fillers)?;
        println!("Initialized {} words in {:.2?}", words, started.elapsed());

        let started = Instant::now();
        heap_sort(&Words::new(&mmu), words)?;
        println!("Sorted in {:.2?}", started.elapsed());

        let started = Instant::now();
        let stats = region.unmap()?;
        println!("Unmapped in {:.2?}", started.elapsed());
        println!("{}", stats);
    }

    // Verify from a fresh mapping.
    let sorted = {
        let store = Arc::new(FileStore::open(&path, cli.direct)?);
        let mmu = Arc::new(SoftMmu::new(layout));
        let region = Region::map(store, mmu.clone(), layout, config)?;
        let started = Instant::now();
        let sorted = verify(&Words::new(&mmu), words)?;
        println!("Verified in {:.2?}", started.elapsed());
        region.unmap()?;
        sorted
    };

    if cli.file.is_some() && !cli.keep {
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }

    if !sorted {
        bail!("Data is not sorted after remapping {}", path.display());
    }
    println!("Data is sorted");
    Ok(())
}

/// Word-indexed view of the region.
struct Words<'a> {
    mmu: &'a SoftMmu,
    base: u64,
}

impl<'a> Words<'a> {
    fn new(mmu: &'a SoftMmu) -> Self {
        Self {
            base: mmu.layout().base(),
            mmu,
        }
    }

    fn get(&self, index: u64) -> Result<u64> {
        Ok(self.mmu.read_u64(self.base + index * WORD)?)
    }

    fn set(&self, index: u64, value: u64) -> Result<()> {
        Ok(self.mmu.write_u64(self.base + index * WORD, value)?)
    }

    fn swap(&self, a: u64, b: u64) -> Result<()> {
        let (x, y) = (self.get(a)?, self.get(b)?);
        self.set(a, y)?;
        self.set(b, x)
    }
}

fn scramble(index: u64) -> u64 {
    let mut z = index.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn fill(mmu: &SoftMmu, words: u64, threads: usize) -> Result<()> {
    let threads = threads.max(1) as u64;
    let chunk = words.div_ceil(threads);
    thread::scope(|scope| {
        let workers: Vec<_> = (0..threads)
            .map(|t| {
                scope.spawn(move || -> Result<()> {
                    let view = Words::new(mmu);
                    for i in (t * chunk)..((t + 1) * chunk).min(words) {
                        view.set(i, scramble(i))?;
                    }
                    Ok(())
                })
            })
            .collect();
        for worker in workers {
            match worker.join() {
                Ok(result) => result?,
                Err(_) => bail!("A fill thread panicked"),
            }
        }
        Ok(())
    })
}

fn heap_sort(view: &Words<'_>, len: u64) -> Result<()> {
    if len < 2 {
        return Ok(());
    }
    let mut start = len / 2;
    while start > 0 {
        start -= 1;
        sift_down(view, start, len)?;
    }
    let mut end = len;
    while end > 1 {
        end -= 1;
        view.swap(0, end)?;
        sift_down(view, 0, end)?;
    }
    Ok(())
}

fn sift_down(view: &Words<'_>, mut root: u64, end: u64) -> Result<()> {
    loop {
        let child = 2 * root + 1;
        if child >= end {
            return Ok(());
        }
        let mut largest = child;
        let mut largest_value = view.get(child)?;
        if child + 1 < end {
            let right = view.get(child + 1)?;
            if right > largest_value {
                largest = child + 1;
                largest_value = right;
            }
        }
        if view.get(root)? >= largest_value {
            return Ok(());
        }
        view.swap(root, largest)?;
        root = largest;
    }
}

fn verify(view: &Words<'_>, len: u64) -> Result<bool> {
    let mut previous = 0u64;
    for i in 0..len {
        let value = view.get(i)?;
        if value < previous {
            log::error!("Word {} ({}) is smaller than its predecessor ({})", i, value, previous);
            return Ok(false);
        }
        previous = value;
    }
    Ok(true)
}
