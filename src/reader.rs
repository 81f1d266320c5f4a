// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Loading of road networks and traces from plain-text files.
//!
//! Networks are described one record per line:
//!
//! ```text
//! # comment
//! node <id> <lat> <lon>
//! edge <from_id> <to_id> [cost]
//! road <id> <id> [<id> ...]
//! ```
//!
//! `edge` creates a one-way connection, with the cost defaulting to the crow-flies
//! distance between the nodes (in kilometers). `road` connects a chain of nodes
//! in both directions with crow-flies costs. Nodes must be defined before they
//! are referenced.
//!
//! Traces are one position per line, as `<lat> <lon>` or `<lat>,<lon>`.

use std::fs::File;
use std::io::{self, BufRead};
use std::path::Path;

use crate::{earth_distance, Edge, Graph, Node, Position};

/// Compression of the input file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Unknown format - guess based on the file extension (`.gz`, `.bz2`),
    /// assuming uncompressed data for buffers and streams.
    Unknown,

    /// Force uncompressed text
    Plain,

    /// Force [gzip](https://en.wikipedia.org/wiki/Gzip) compressed text
    Gz,

    /// Force [bzip2](https://en.wikipedia.org/wiki/Bzip2) compressed text
    Bz2,
}

impl FileFormat {
    /// Resolves [FileFormat::Unknown] based on the extension of the provided path.
    pub fn guess<P: AsRef<Path>>(self, path: P) -> Self {
        if self != FileFormat::Unknown {
            return self;
        }

        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some("gz") => FileFormat::Gz,
            Some("bz2") => FileFormat::Bz2,
            _ => FileFormat::Plain,
        }
    }
}

/// Error which can occur when reading a network or a trace.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: unknown record type {record:?}")]
    UnknownRecord { line: usize, record: String },

    #[error("line {line}: expected {expected}")]
    MissingField { line: usize, expected: &'static str },

    #[error("line {line}: invalid {field}: {value:?}")]
    InvalidValue {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("line {line}: unexpected trailing data: {data:?}")]
    TrailingData { line: usize, data: String },

    #[error("line {line}: reference to undefined node {id}")]
    UndefinedNode { line: usize, id: i64 },
}

/// Wraps the reader in a decompressor and a line buffer, as per the provided format.
fn open<'r, R: io::Read + 'r>(format: FileFormat, reader: R) -> Box<dyn BufRead + 'r> {
    match format {
        FileFormat::Unknown | FileFormat::Plain => Box::new(io::BufReader::new(reader)),
        FileFormat::Gz => Box::new(io::BufReader::new(flate2::read::MultiGzDecoder::new(
            reader,
        ))),
        FileFormat::Bz2 => Box::new(io::BufReader::new(bzip2::read::MultiBzDecoder::new(
            reader,
        ))),
    }
}

/// Iterates over non-empty, non-comment lines, together with their 1-based numbers.
fn records<R: BufRead>(reader: R) -> impl Iterator<Item = Result<(usize, String), Error>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| match line {
            Ok(line) => {
                let content = line.split('#').next().unwrap_or_default().trim();
                if content.is_empty() {
                    None
                } else {
                    Some(Ok((idx + 1, content.to_string())))
                }
            }
            Err(e) => Some(Err(Error::Io(e))),
        })
}

/// Splits a record into fields on whitespace and commas.
struct Fields<'a> {
    line: usize,
    inner: std::vec::IntoIter<&'a str>,
}

impl<'a> Fields<'a> {
    fn new(line: usize, content: &'a str) -> Self {
        let fields = content
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        Self {
            line,
            inner: fields.into_iter(),
        }
    }

    fn next_str(&mut self, expected: &'static str) -> Result<&'a str, Error> {
        self.inner.next().ok_or(Error::MissingField {
            line: self.line,
            expected,
        })
    }

    fn next<T: std::str::FromStr>(&mut self, field: &'static str) -> Result<T, Error> {
        let value = self.next_str(field)?;
        value.parse().map_err(|_| Error::InvalidValue {
            line: self.line,
            field,
            value: value.to_string(),
        })
    }

    fn next_optional<T: std::str::FromStr>(
        &mut self,
        field: &'static str,
    ) -> Result<Option<T>, Error> {
        match self.inner.next() {
            None => Ok(None),
            Some(value) => value.parse().map(Some).map_err(|_| Error::InvalidValue {
                line: self.line,
                field,
                value: value.to_string(),
            }),
        }
    }

    fn finish(mut self) -> Result<(), Error> {
        match self.inner.next() {
            None => Ok(()),
            Some(data) => Err(Error::TrailingData {
                line: self.line,
                data: data.to_string(),
            }),
        }
    }
}

fn parse_coordinate(fields: &mut Fields<'_>, field: &'static str, limit: f32) -> Result<f32, Error> {
    let value: f32 = fields.next(field)?;
    if value.is_finite() && value.abs() <= limit {
        Ok(value)
    } else {
        Err(Error::InvalidValue {
            line: fields.line,
            field,
            value: value.to_string(),
        })
    }
}

fn get_node(g: &Graph, line: usize, id: i64) -> Result<Node, Error> {
    g.get_node(id).ok_or(Error::UndefinedNode { line, id })
}

fn add_record(g: &mut Graph, line: usize, content: &str) -> Result<(), Error> {
    let mut fields = Fields::new(line, content);

    match fields.next_str("record type")? {
        "node" => {
            let id = fields.next("node id")?;
            let lat = parse_coordinate(&mut fields, "latitude", 90.0)?;
            let lon = parse_coordinate(&mut fields, "longitude", 180.0)?;
            fields.finish()?;
            g.set_node(Node::new(id, lat, lon));
        }

        "edge" => {
            let from = get_node(g, line, fields.next("edge start")?)?;
            let to = get_node(g, line, fields.next("edge end")?)?;
            let cost = match fields.next_optional::<f32>("edge cost")? {
                Some(cost) if cost.is_finite() && cost >= 0.0 => cost,
                Some(cost) => {
                    return Err(Error::InvalidValue {
                        line,
                        field: "edge cost",
                        value: cost.to_string(),
                    })
                }
                None => earth_distance(from.lat, from.lon, to.lat, to.lon),
            };
            fields.finish()?;
            g.set_edge(from.id, Edge { to: to.id, cost });
        }

        "road" => {
            let mut previous = get_node(g, line, fields.next("road node")?)?;
            let mut has_segment = false;
            while let Some(id) = fields.next_optional::<i64>("road node")? {
                let node = get_node(g, line, id)?;
                g.connect(previous.id, node.id);
                g.connect(node.id, previous.id);
                previous = node;
                has_segment = true;
            }

            if !has_segment {
                return Err(Error::MissingField {
                    line,
                    expected: "at least two road nodes",
                });
            }
        }

        record => {
            return Err(Error::UnknownRecord {
                line,
                record: record.to_string(),
            })
        }
    }

    Ok(())
}

/// Parse a network description from a reader into a [Graph].
///
/// The provided stream will be automatically wrapped in a buffered reader.
/// [FileFormat::Unknown] is treated as uncompressed text.
pub fn add_graph_from_io<R: io::Read>(
    g: &mut Graph,
    format: FileFormat,
    reader: R,
) -> Result<(), Error> {
    for record in records(open(format, reader)) {
        let (line, content) = record?;
        add_record(g, line, &content)?;
    }
    Ok(())
}

/// Parse a network description from a file at the provided path into a [Graph].
pub fn add_graph_from_file<P: AsRef<Path>>(
    g: &mut Graph,
    format: FileFormat,
    path: P,
) -> Result<(), Error> {
    let format = format.guess(&path);
    let f = File::open(path)?;
    add_graph_from_io(g, format, f)
}

/// Parse a network description from a static buffer into a [Graph].
pub fn add_graph_from_buffer(g: &mut Graph, format: FileFormat, data: &[u8]) -> Result<(), Error> {
    add_graph_from_io(g, format, io::Cursor::new(data))
}

/// Read trace positions from a reader.
///
/// [FileFormat::Unknown] is treated as uncompressed text.
pub fn read_trace_from_io<R: io::Read>(format: FileFormat, reader: R) -> Result<Vec<Position>, Error> {
    records(open(format, reader))
        .map(|record| {
            let (line, content) = record?;
            let mut fields = Fields::new(line, &content);
            let lat = parse_coordinate(&mut fields, "latitude", 90.0)?;
            let lon = parse_coordinate(&mut fields, "longitude", 180.0)?;
            fields.finish()?;
            Ok(Position::new(lat, lon))
        })
        .collect()
}

/// Read trace positions from a file at the provided path.
pub fn read_trace_from_file<P: AsRef<Path>>(
    format: FileFormat,
    path: P,
) -> Result<Vec<Position>, Error> {
    let format = format.guess(&path);
    let f = File::open(path)?;
    read_trace_from_io(format, f)
}
