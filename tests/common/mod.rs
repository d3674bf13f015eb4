//! Synthesises small MDict containers for integration tests.
#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use adler2::adler32_slice;
use flate2::{write::ZlibEncoder, Compression as ZlibLevel};
use mdict_index::mdict::codec::crypto;
use ripemd::{Digest, Ripemd128};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Stored,
    Zlib,
    /// Literal-only LZO1X stream; payloads must stay under 239 bytes.
    Lzo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V1,
    V2,
}

impl Version {
    fn engine(self) -> &'static str {
        match self {
            Version::V1 => "1.2",
            Version::V2 => "2.0",
        }
    }

    fn put_number(self, out: &mut Vec<u8>, n: u64) {
        match self {
            Version::V1 => out.extend_from_slice(&(n as u32).to_be_bytes()),
            Version::V2 => out.extend_from_slice(&n.to_be_bytes()),
        }
    }

    fn put_small(self, out: &mut Vec<u8>, n: usize) {
        match self {
            Version::V1 => out.push(n as u8),
            Version::V2 => out.extend_from_slice(&(n as u16).to_be_bytes()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyText {
    Utf8,
    Utf16,
    Gbk,
}

impl KeyText {
    fn encode(self, text: &str) -> Vec<u8> {
        match self {
            KeyText::Utf8 => text.as_bytes().to_vec(),
            KeyText::Utf16 => utf16(text),
            KeyText::Gbk => encoding_rs::GBK.encode(text).0.into_owned(),
        }
    }

    fn unit(self) -> usize {
        match self {
            KeyText::Utf16 => 2,
            _ => 1,
        }
    }

    fn label(self) -> &'static str {
        match self {
            KeyText::Utf8 => "UTF-8",
            KeyText::Utf16 => "UTF-16",
            KeyText::Gbk => "GBK",
        }
    }
}

pub fn utf16(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

/// Registration code (hex) that unlocks `master` for `email`.
pub fn registration_code(master: [u8; 16], email: &str) -> String {
    let mut hasher = Ripemd128::new();
    hasher.update(email.as_bytes());
    let salsa_key: [u8; 16] = hasher.finalize().into();
    let mut code = master;
    crypto::salsa_decrypt(&mut code, &salsa_key);
    hex::encode(code)
}

fn fast_encrypt(data: &mut [u8], key: &[u8]) {
    let mut prev = 0x36u8;
    for (i, byte) in data.iter_mut().enumerate() {
        let cipher = (*byte ^ prev ^ (i as u8) ^ key[i % key.len()]).rotate_left(4);
        *byte = cipher;
        prev = cipher;
    }
}

fn compress(payload: &[u8], method: Compression) -> Vec<u8> {
    match method {
        Compression::Stored => payload.to_vec(),
        Compression::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), ZlibLevel::default());
            encoder.write_all(payload).unwrap();
            encoder.finish().unwrap()
        }
        Compression::Lzo => {
            assert!(payload.len() <= 238, "literal LZO stream too long");
            let mut out = vec![17 + payload.len() as u8];
            out.extend_from_slice(payload);
            out.extend_from_slice(&[0x11, 0, 0]);
            out
        }
    }
}

fn method_tag(method: Compression) -> u32 {
    match method {
        Compression::Stored => 0,
        Compression::Zlib => 2,
        Compression::Lzo => 1,
    }
}

/// `[info][adler32][payload]` with an optional Salsa20 layer keyed by `master`.
fn pack_block(payload: &[u8], method: Compression, master: Option<[u8; 16]>) -> Vec<u8> {
    let checksum = adler32_slice(payload);
    let mut body = compress(payload, method);
    let mut info = method_tag(method);
    if let Some(key) = master {
        let len = body.len().min(0xFF);
        crypto::salsa_decrypt(&mut body[..len], &key);
        info |= 2 << 4;
        info |= (len as u32) << 8;
    }
    let mut raw = info.to_le_bytes().to_vec();
    raw.extend_from_slice(&checksum.to_be_bytes());
    raw.extend_from_slice(&body);
    raw
}

/// Fast-XOR encrypted block whose key comes from its own checksum.
fn pack_fast_block(payload: &[u8], method: Compression, encrypted_len: usize) -> Vec<u8> {
    let checksum = adler32_slice(payload).to_be_bytes();
    let mut body = compress(payload, method);
    let len = encrypted_len.min(body.len()).min(0xFF);
    let mut hasher = Ripemd128::new();
    hasher.update(checksum);
    let key: [u8; 16] = hasher.finalize().into();
    fast_encrypt(&mut body[..len], &key);
    let info = method_tag(method) | (1 << 4) | ((len as u32) << 8);
    let mut raw = info.to_le_bytes().to_vec();
    raw.extend_from_slice(&checksum);
    raw.extend_from_slice(&body);
    raw
}

fn pack_key_index(payload: &[u8], method: Compression) -> Vec<u8> {
    let checksum = adler32_slice(payload).to_be_bytes();
    let mut body = compress(payload, method);
    let mut hasher = Ripemd128::new();
    hasher.update(checksum);
    hasher.update(0x3695u32.to_le_bytes());
    let key: [u8; 16] = hasher.finalize().into();
    fast_encrypt(&mut body, &key);
    let mut raw = method_tag(method).to_le_bytes().to_vec();
    raw.extend_from_slice(&checksum);
    raw.extend_from_slice(&body);
    raw
}

/// Location of a block inside a written container.
#[derive(Debug, Clone, Copy)]
pub struct Span {
    pub start: u64,
    pub len: u64,
}

/// Byte positions of interest in a written container.
#[derive(Debug, Clone, Default)]
pub struct Layout {
    pub key_blocks: Vec<Span>,
    pub record_blocks: Vec<Span>,
}

/// Builder for one `.mdx` or `.mdd` file.
#[derive(Debug, Clone)]
pub struct Container {
    version: Version,
    keys: KeyText,
    encoding_attr: Option<String>,
    title: String,
    compression: Compression,
    keys_per_block: usize,
    records_per_block: usize,
    encrypt_key_index: bool,
    fast_records: bool,
    master: Option<[u8; 16]>,
    entries: Vec<(String, Vec<u8>)>,
}

impl Container {
    pub fn mdx() -> Self {
        Self {
            version: Version::V2,
            keys: KeyText::Utf8,
            encoding_attr: Some("UTF-8".to_string()),
            title: "Test Dictionary".to_string(),
            compression: Compression::Zlib,
            keys_per_block: 3,
            records_per_block: 4,
            encrypt_key_index: false,
            fast_records: false,
            master: None,
            entries: Vec::new(),
        }
    }

    /// Resource container: UTF-16LE keys and no `Encoding` attribute.
    pub fn mdd() -> Self {
        Self {
            keys: KeyText::Utf16,
            encoding_attr: None,
            title: "Test Resources".to_string(),
            ..Self::mdx()
        }
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn keys(mut self, keys: KeyText) -> Self {
        self.keys = keys;
        self.encoding_attr = Some(keys.label().to_string());
        self
    }

    pub fn encoding_attr(mut self, label: Option<&str>) -> Self {
        self.encoding_attr = label.map(str::to_string);
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn keys_per_block(mut self, n: usize) -> Self {
        self.keys_per_block = n.max(1);
        self
    }

    pub fn records_per_block(mut self, n: usize) -> Self {
        self.records_per_block = n.max(1);
        self
    }

    pub fn encrypt_key_index(mut self) -> Self {
        self.encrypt_key_index = true;
        self
    }

    /// Record blocks fast-XOR encrypted with checksum-derived keys.
    pub fn fast_encrypted_records(mut self) -> Self {
        self.fast_records = true;
        self
    }

    /// Encrypts the key block info and record blocks with `master`.
    pub fn master_key(mut self, master: [u8; 16]) -> Self {
        self.master = Some(master);
        self
    }

    /// Text entry encoded like the keys.
    pub fn entry(mut self, key: &str, text: &str) -> Self {
        let bytes = self.keys.encode(text);
        self.entries.push((key.to_string(), bytes));
        self
    }

    pub fn raw_entry(mut self, key: &str, bytes: &[u8]) -> Self {
        self.entries.push((key.to_string(), bytes.to_vec()));
        self
    }

    /// `@@@LINK=` redirect encoded like the keys.
    pub fn link(self, key: &str, target: &str) -> Self {
        self.entry(key, &format!("@@@LINK={}", target))
    }

    pub fn write(&self, path: &Path) -> Layout {
        let (bytes, layout) = self.to_bytes();
        std::fs::write(path, bytes).unwrap();
        layout
    }

    pub fn write_in(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        self.write(&path);
        path
    }

    fn header(&self) -> Vec<u8> {
        let encrypted = self.master.map_or(0, |_| 1) | if self.encrypt_key_index { 2 } else { 0 };
        let encoding = self
            .encoding_attr
            .as_ref()
            .map(|e| format!(" Encoding=\"{}\"", e))
            .unwrap_or_default();
        let xml = format!(
            "<Dictionary GeneratedByEngineVersion=\"{v}\" RequiredEngineVersion=\"{v}\" \
             Encrypted=\"{encrypted}\"{encoding} Format=\"Html\" Title=\"{title}\" \
             Description=\"Synthetic &lt;b&gt;test&lt;/b&gt; data\"/>\r\n\0",
            v = self.version.engine(),
            title = self.title,
        );
        let xml = utf16(&xml);
        let mut out = (xml.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(&xml);
        out.extend_from_slice(&adler32_slice(&xml).to_le_bytes());
        out
    }

    fn record_block(&self, payload: &[u8]) -> Vec<u8> {
        if self.fast_records {
            pack_fast_block(payload, self.compression, 16)
        } else {
            pack_block(payload, self.compression, self.master)
        }
    }

    pub fn to_bytes(&self) -> (Vec<u8>, Layout) {
        let v = self.version;
        let unit = self.keys.unit();

        // Record stream, cut into blocks by entry count.
        let mut offsets = Vec::with_capacity(self.entries.len());
        let mut record_payloads: Vec<Vec<u8>> = Vec::new();
        let mut running = 0u64;
        for (i, (_, record)) in self.entries.iter().enumerate() {
            if i % self.records_per_block == 0 {
                record_payloads.push(Vec::new());
            }
            offsets.push(running);
            running += record.len() as u64;
            if let Some(block) = record_payloads.last_mut() {
                block.extend_from_slice(record);
            }
        }

        // Key blocks and their descriptors.
        let mut key_index = Vec::new();
        let mut key_blocks: Vec<Vec<u8>> = Vec::new();
        let indexed: Vec<_> = self.entries.iter().zip(&offsets).collect();
        for chunk in indexed.chunks(self.keys_per_block) {
            let mut plain = Vec::new();
            for &(entry, &offset) in chunk {
                v.put_number(&mut plain, offset);
                plain.extend_from_slice(&self.keys.encode(&entry.0));
                plain.extend(std::iter::repeat(0u8).take(unit));
            }
            let raw = pack_block(&plain, self.compression, None);

            v.put_number(&mut key_index, chunk.len() as u64);
            let (first, last) = (chunk[0].0, chunk[chunk.len() - 1].0);
            for key in [&first.0, &last.0] {
                let encoded = self.keys.encode(key);
                v.put_small(&mut key_index, encoded.len() / unit);
                key_index.extend_from_slice(&encoded);
                if v == Version::V2 {
                    key_index.extend(std::iter::repeat(0u8).take(unit));
                }
            }
            v.put_number(&mut key_index, raw.len() as u64);
            v.put_number(&mut key_index, plain.len() as u64);
            key_blocks.push(raw);
        }

        let key_index_raw = match v {
            Version::V1 => key_index.clone(),
            Version::V2 if self.encrypt_key_index => pack_key_index(&key_index, self.compression),
            Version::V2 => pack_block(&key_index, self.compression, None),
        };
        let key_blocks_len: usize = key_blocks.iter().map(Vec::len).sum();

        let mut out = self.header();

        let mut info = Vec::new();
        v.put_number(&mut info, key_blocks.len() as u64);
        v.put_number(&mut info, self.entries.len() as u64);
        if v == Version::V2 {
            v.put_number(&mut info, key_index.len() as u64);
        }
        v.put_number(&mut info, key_index_raw.len() as u64);
        v.put_number(&mut info, key_blocks_len as u64);
        let info_checksum = adler32_slice(&info);
        if let Some(key) = self.master {
            crypto::salsa_decrypt(&mut info, &key);
        }
        out.extend_from_slice(&info);
        if v == Version::V2 {
            out.extend_from_slice(&info_checksum.to_be_bytes());
        }
        out.extend_from_slice(&key_index_raw);

        let mut layout = Layout::default();
        for block in &key_blocks {
            layout.key_blocks.push(Span {
                start: out.len() as u64,
                len: block.len() as u64,
            });
            out.extend_from_slice(block);
        }

        let record_blocks: Vec<Vec<u8>> =
            record_payloads.iter().map(|p| self.record_block(p)).collect();
        let mut record_index = Vec::new();
        for (raw, plain) in record_blocks.iter().zip(&record_payloads) {
            v.put_number(&mut record_index, raw.len() as u64);
            v.put_number(&mut record_index, plain.len() as u64);
        }
        let record_blocks_len: usize = record_blocks.iter().map(Vec::len).sum();
        v.put_number(&mut out, record_blocks.len() as u64);
        v.put_number(&mut out, self.entries.len() as u64);
        v.put_number(&mut out, record_index.len() as u64);
        v.put_number(&mut out, record_blocks_len as u64);
        out.extend_from_slice(&record_index);
        for block in &record_blocks {
            layout.record_blocks.push(Span {
                start: out.len() as u64,
                len: block.len() as u64,
            });
            out.extend_from_slice(block);
        }

        (out, layout)
    }
}

/// A small English dictionary with a hyphenated headword and redirects.
pub fn sample_mdx() -> Container {
    Container::mdx()
        .entry("apple", "<b>apple</b> a fruit")
        .entry("Banana", "<b>banana</b> a long fruit")
        .entry("cherry", "<b>cherry</b> a small fruit")
        .link("colour", "color")
        .entry("color", "<b>color</b> a hue")
        .entry("co-operate", "<b>co-operate</b> work together")
        .entry("date", "<b>date</b> a sweet fruit")
        .entry("elder", "<b>elder</b> a shrub")
        .link("fig", "apple")
}
