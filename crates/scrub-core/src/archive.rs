//! Example Archive - Binary Memory-Mapped Image Storage
//!
//! Labeled image sets as produced by the loss-guided isolation stage:
//! a fixed header, a block of u32 labels, then raw u8 CHW pixel data.

use anyhow::Context;
use bytemuck::{Pod, Zeroable};
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Header for the binary archive file
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ArchiveHeader {
    /// Magic bytes: "SCRB"
    pub magic: [u8; 4],
    /// Version
    pub version: u32,
    /// Number of labeled examples
    pub num_examples: u64,
    /// Image channels
    pub channels: u32,
    /// Image height
    pub height: u32,
    /// Image width
    pub width: u32,
    /// Number of label classes
    pub num_classes: u32,
    /// Reserved for future use
    pub _reserved: [u8; 24],
}

impl ArchiveHeader {
    pub const MAGIC: [u8; 4] = *b"SCRB";
    pub const VERSION: u32 = 1;

    pub fn new(num_examples: u64, channels: u32, height: u32, width: u32, num_classes: u32) -> Self {
        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            num_examples,
            channels,
            height,
            width,
            num_classes,
            _reserved: [0; 24],
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == Self::MAGIC && self.version == Self::VERSION
    }

    /// Bytes per image (channels * height * width)
    pub fn example_bytes(&self) -> usize {
        self.channels as usize * self.height as usize * self.width as usize
    }
}

/// Memory-mapped archive of labeled images
pub struct ExampleArchive {
    mmap: Mmap,
    header: ArchiveHeader,
    labels_offset: usize,
    images_offset: usize,
}

impl ExampleArchive {
    /// Load an archive, validating header and payload size
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open archive {}", path.display()))?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        let header_size = std::mem::size_of::<ArchiveHeader>();
        if mmap.len() < header_size {
            anyhow::bail!("Archive file too small: {}", path.display());
        }

        let header: ArchiveHeader = *bytemuck::from_bytes(&mmap[..header_size]);
        if !header.is_valid() {
            anyhow::bail!("Invalid archive file (bad magic or version): {}", path.display());
        }

        let n = header.num_examples as usize;
        let labels_offset = header_size;
        let images_offset = labels_offset + n * std::mem::size_of::<u32>();
        let expected = images_offset + n * header.example_bytes();
        if mmap.len() < expected {
            anyhow::bail!(
                "Truncated archive {}: {} bytes, expected at least {}",
                path.display(),
                mmap.len(),
                expected
            );
        }

        Ok(Self {
            mmap,
            header,
            labels_offset,
            images_offset,
        })
    }

    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.header.num_examples as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Image shape as (channels, height, width)
    pub fn image_dims(&self) -> (usize, usize, usize) {
        (
            self.header.channels as usize,
            self.header.height as usize,
            self.header.width as usize,
        )
    }

    pub fn num_classes(&self) -> usize {
        self.header.num_classes as usize
    }

    pub fn example_bytes(&self) -> usize {
        self.header.example_bytes()
    }

    /// All labels as a slice (zero-copy)
    pub fn labels(&self) -> &[u32] {
        let end = self.labels_offset + self.len() * std::mem::size_of::<u32>();
        bytemuck::cast_slice(&self.mmap[self.labels_offset..end])
    }

    pub fn label(&self, idx: usize) -> Option<u32> {
        self.labels().get(idx).copied()
    }

    /// Raw CHW pixel bytes of one image (zero-copy)
    pub fn image(&self, idx: usize) -> Option<&[u8]> {
        if idx >= self.len() {
            return None;
        }
        let bytes = self.example_bytes();
        let start = self.images_offset + idx * bytes;
        Some(&self.mmap[start..start + bytes])
    }
}

/// Archive builder - collects labeled images and writes the binary format
pub struct ArchiveBuilder {
    channels: u32,
    height: u32,
    width: u32,
    num_classes: u32,
    labels: Vec<u32>,
    pixels: Vec<u8>,
}

impl ArchiveBuilder {
    pub fn new(channels: u32, height: u32, width: u32, num_classes: u32) -> Self {
        Self {
            channels,
            height,
            width,
            num_classes,
            labels: Vec::new(),
            pixels: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn example_bytes(&self) -> usize {
        self.channels as usize * self.height as usize * self.width as usize
    }

    /// Append one labeled CHW image
    pub fn push(&mut self, label: u32, image: &[u8]) -> anyhow::Result<()> {
        if image.len() != self.example_bytes() {
            anyhow::bail!(
                "Image has {} bytes, expected {}",
                image.len(),
                self.example_bytes()
            );
        }
        if label >= self.num_classes {
            anyhow::bail!("Label {} out of range for {} classes", label, self.num_classes);
        }
        self.labels.push(label);
        self.pixels.extend_from_slice(image);
        Ok(())
    }

    /// Write the archive file, creating parent directories as needed
    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create archive {}", path.display()))?;
        let mut writer = BufWriter::new(file);

        let header = ArchiveHeader::new(
            self.labels.len() as u64,
            self.channels,
            self.height,
            self.width,
            self.num_classes,
        );
        writer.write_all(bytemuck::bytes_of(&header))?;
        writer.write_all(bytemuck::cast_slice(&self.labels))?;
        writer.write_all(&self.pixels)?;
        writer.flush()?;

        Ok(())
    }
}
