//! Shared fixtures: archives and images built in-process.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use zip::write::SimpleFileOptions;
use zip::{DateTime, ZipWriter};

/// Entry timestamp used unless a test sets its own
pub const DEFAULT_TIME: (u16, u8, u8, u8, u8, u8) = (2006, 1, 1, 12, 0, 0);

/// Builder for a test archive
#[derive(Debug, Clone, Default)]
pub struct JarBuilder {
    entries: Vec<(String, Vec<u8>, (u16, u8, u8, u8, u8, u8))>,
}

impl JarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Archive with a standard manifest naming the suite and its icon
    pub fn midlet(name: &str, icon: Option<&str>) -> Self {
        Self::new().manifest(&midlet_manifest(name, icon))
    }

    pub fn manifest(self, text: &str) -> Self {
        self.entry("META-INF/MANIFEST.MF", text.as_bytes())
    }

    pub fn entry(self, name: &str, data: &[u8]) -> Self {
        self.entry_at(name, data, DEFAULT_TIME)
    }

    pub fn entry_at(mut self, name: &str, data: &[u8], time: (u16, u8, u8, u8, u8, u8)) -> Self {
        self.entries.push((name.to_string(), data.to_vec(), time));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data, (y, mo, d, h, mi, s)) in &self.entries {
            let time = DateTime::from_date_and_time(*y, *mo, *d, *h, *mi, *s).unwrap();
            let options = SimpleFileOptions::default().last_modified_time(time);
            writer.start_file(name.as_str(), options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    /// Write to `<root>/<title>/<filename>` and return the path
    pub fn write(&self, root: &Path, title: &str, filename: &str) -> PathBuf {
        let dir = root.join(title);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(filename);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

pub fn midlet_manifest(name: &str, icon: Option<&str>) -> String {
    let mut text = format!("Manifest-Version: 1.0\r\nMIDlet-Name: {}\r\n", name);
    if let Some(icon) = icon {
        text.push_str(&format!("MIDlet-1: {}, {}, Main\r\n", name, icon));
    }
    text
}

/// Solid-color image; `shade` makes otherwise equal images hash differently
pub fn image_bytes(width: u32, height: u32, shade: u8, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([shade, 0, 0])))
        .write_to(&mut Cursor::new(&mut buf), format)
        .unwrap();
    buf
}

pub fn png(width: u32, height: u32, shade: u8) -> Vec<u8> {
    image_bytes(width, height, shade, ImageFormat::Png)
}

pub fn bmp(width: u32, height: u32, shade: u8) -> Vec<u8> {
    image_bytes(width, height, shade, ImageFormat::Bmp)
}
