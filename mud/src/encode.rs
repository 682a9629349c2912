// Copyright 2024 Peter Williams and collaborators
// Licensed under the MIT License.

/*!

Writing MUD containers.

[`MudWriter`] collects the records of a run and lays them out as described in
the [`format`](crate::format) module. It is an encoder, not a session: the
whole file is produced in one go.

Absent numeric fields are written as zero and absent text as an empty
string, so those read back as `Some(0)` and `None` respectively.

*/

use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::format::*;
use crate::histogram::Histogram;
use crate::numeric::{ElementKind, NumericLayout};
use crate::records::{Comment, HistoricalData, IndependentVariable, RunDescription, Scaler};
use crate::MudError;

/// Wrap a body in a core section header.
pub fn section_bytes(sec_id: u32, instance: u32, body: &[u8]) -> Vec<u8> {
    let mut s = Vec::with_capacity(CORE_HEADER_SIZE + body.len());
    s.extend_from_slice(&(body.len() as u32).to_le_bytes());
    s.extend_from_slice(&sec_id.to_le_bytes());
    s.extend_from_slice(&instance.to_le_bytes());
    s.extend_from_slice(body);
    s
}

/// Build a group section of the given kind from complete member sections.
pub fn group_bytes(kind: u32, members: &[Vec<u8>]) -> Vec<u8> {
    let mem_size: usize = members.iter().map(|m| m.len()).sum();
    let mut body = Vec::with_capacity(8 + members.len() * INDEX_ENTRY_SIZE + mem_size);
    body.extend_from_slice(&(members.len() as u32).to_le_bytes());
    body.extend_from_slice(&(mem_size as u32).to_le_bytes());

    let mut offset = 0;

    for m in members {
        body.extend_from_slice(&(offset as u32).to_le_bytes());
        // The member's own sec ID and instance.
        body.extend_from_slice(&m[4..CORE_HEADER_SIZE]);
        offset += m.len();
    }

    for m in members {
        body.extend_from_slice(m);
    }

    section_bytes(SEC_GROUP, kind, &body)
}

fn put_text(dest: &mut Vec<u8>, text: Option<&str>) -> Result<(), MudError> {
    let bytes = latin1(text.unwrap_or(""));

    if bytes.len() > u16::MAX as usize {
        return muderr!("string of {} bytes is too long to store", bytes.len());
    }

    dest.write_u16::<LittleEndian>(bytes.len() as u16)?;
    dest.extend_from_slice(&bytes);
    Ok(())
}

/// Characters outside Latin-1 become `?`.
fn latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) < 0x100 { c as u32 as u8 } else { b'?' })
        .collect()
}

fn put_u32(dest: &mut Vec<u8>, v: Option<u32>) -> io::Result<()> {
    dest.write_u32::<LittleEndian>(v.unwrap_or(0))
}

fn put_f64(dest: &mut Vec<u8>, v: Option<f64>) -> io::Result<()> {
    dest.write_f64::<LittleEndian>(v.unwrap_or(0.0))
}

pub fn run_description_body(rd: &RunDescription) -> Result<Vec<u8>, MudError> {
    let mut b = Vec::new();

    for v in &[
        rd.experiment_number,
        rd.run_number,
        rd.time_begin,
        rd.time_end,
        rd.elapsed_seconds,
    ] {
        put_u32(&mut b, *v)?;
    }

    for t in &[
        &rd.title,
        &rd.lab,
        &rd.area,
        &rd.method,
        &rd.apparatus,
        &rd.insert,
        &rd.sample,
        &rd.orientation,
        &rd.das,
        &rd.experimenters,
        &rd.temperature,
        &rd.field,
        &rd.subtitle,
        &rd.header_comments[0],
        &rd.header_comments[1],
        &rd.header_comments[2],
    ] {
        put_text(&mut b, t.as_deref())?;
    }

    Ok(b)
}

pub fn comment_body(c: &Comment) -> Result<Vec<u8>, MudError> {
    let mut b = Vec::new();
    put_u32(&mut b, c.prev.map(|n| n as u32))?;
    put_u32(&mut b, c.next.map(|n| n as u32))?;
    put_u32(&mut b, c.time)?;
    put_text(&mut b, c.author.as_deref())?;
    put_text(&mut b, c.title.as_deref())?;
    put_text(&mut b, c.body.as_deref())?;
    Ok(b)
}

pub fn scaler_body(s: &Scaler) -> Result<Vec<u8>, MudError> {
    let mut b = Vec::new();
    put_u32(&mut b, s.count)?;
    put_text(&mut b, s.label.as_deref())?;
    Ok(b)
}

pub fn ind_var_body(v: &IndependentVariable) -> Result<Vec<u8>, MudError> {
    let mut b = Vec::new();

    for x in &[v.low, v.high, v.mean, v.std_dev, v.skewness] {
        put_f64(&mut b, *x)?;
    }

    put_text(&mut b, v.name.as_deref())?;
    put_text(&mut b, v.description.as_deref())?;
    put_text(&mut b, v.units.as_deref())?;
    Ok(b)
}

/// Encode the history of an independent variable.
///
/// Integers are stored in 4 bytes if they all fit and 8 otherwise, reals in
/// 8 bytes, and text in fixed-width slots as wide as the longest entry.
pub fn array_body(data: &HistoricalData, times: Option<&[u32]>) -> Result<Vec<u8>, MudError> {
    let mut payload = Vec::new();

    let elem_size = match data {
        HistoricalData::Integer(v) => {
            let narrow = v.iter().all(|&x| x >= i32::MIN as i64 && x <= i32::MAX as i64);
            let layout = NumericLayout::resolve(if narrow { 4 } else { 8 }, ElementKind::Integer)?;
            layout.encode_integers(v, &mut payload)?;
            layout.size()
        }

        HistoricalData::Real(v) => {
            let layout = NumericLayout::Float64;
            layout.encode_reals(v, &mut payload)?;
            layout.size()
        }

        HistoricalData::Text(v) => {
            let encoded: Vec<Vec<u8>> = v
                .iter()
                .map(|t| latin1(t.as_deref().unwrap_or("")))
                .collect();
            let width = encoded.iter().map(|e| e.len()).max().unwrap_or(0).max(1);

            for e in &encoded {
                payload.extend_from_slice(e);
                payload.resize(payload.len() + width - e.len(), 0);
            }

            width
        }
    };

    if let Some(t) = times {
        if t.len() != data.len() {
            return muderr!(
                "history has {} entries but {} timestamps",
                data.len(),
                t.len()
            );
        }
    }

    let mut b = Vec::with_capacity(20 + payload.len() + 4 * data.len());
    b.write_u32::<LittleEndian>(data.len() as u32)?;
    b.write_u32::<LittleEndian>(elem_size as u32)?;
    b.write_u32::<LittleEndian>(data.data_type() as u32)?;
    b.write_u32::<LittleEndian>(times.is_some() as u32)?;
    b.write_u32::<LittleEndian>(payload.len() as u32)?;
    b.extend_from_slice(&payload);

    for &t in times.unwrap_or(&[]) {
        b.write_u32::<LittleEndian>(t)?;
    }

    Ok(b)
}

/// The binning settings shared by all of the histograms of a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HistogramFormat {
    pub hist_type: u32,
    pub bytes_per_bin: u32,
    pub fs_per_bin: u32,
}

impl HistogramFormat {
    pub fn new(hist_type: u32, bytes_per_bin: u32, fs_per_bin: u32) -> Self {
        HistogramFormat {
            hist_type,
            bytes_per_bin,
            fs_per_bin,
        }
    }
}

impl Default for HistogramFormat {
    fn default() -> Self {
        HistogramFormat::new(0, 4, 0)
    }
}

pub fn histogram_header_body(fmt: &HistogramFormat, h: &Histogram) -> Result<Vec<u8>, MudError> {
    let n_bins = h.data.len() as u32;
    let mut b = Vec::new();

    for v in &[
        Some(fmt.hist_type),
        Some(n_bins * fmt.bytes_per_bin),
        Some(n_bins),
        Some(fmt.bytes_per_bin),
        Some(fmt.fs_per_bin),
        h.t0_ps,
        h.t0_bin,
        h.good_bins.map(|r| r.0),
        h.good_bins.map(|r| r.1),
        h.background_bins.map(|r| r.0),
        h.background_bins.map(|r| r.1),
        h.n_events,
    ] {
        put_u32(&mut b, *v)?;
    }

    put_text(&mut b, h.title.as_deref())?;
    Ok(b)
}

pub fn histogram_data_body(fmt: &HistogramFormat, h: &Histogram) -> Result<Vec<u8>, MudError> {
    let width = fmt.bytes_per_bin as usize;

    if ![1, 2, 4].contains(&width) {
        return Err(MudError::UnsupportedWidth {
            size: width,
            kind: ElementKind::Integer,
        });
    }

    let max = if width == 4 {
        u32::MAX
    } else {
        (1u32 << (8 * width)) - 1
    };

    let mut b = Vec::with_capacity(h.data.len() * width);

    for &count in &h.data {
        if count > max {
            return muderr!(
                "bin count {count} of histogram {} does not fit in {width} bytes",
                h.num
            );
        }

        b.extend_from_slice(&count.to_le_bytes()[..width]);
    }

    Ok(b)
}

pub fn histogram_time_body(times: &[u32]) -> Result<Vec<u8>, MudError> {
    if times.len() > u32::MAX as usize {
        return muderr!("{} time data values are too many to store", times.len());
    }

    let mut b = Vec::with_capacity(4 + 4 * times.len());
    b.write_u32::<LittleEndian>(times.len() as u32)?;

    for &t in times {
        b.write_u32::<LittleEndian>(t)?;
    }

    Ok(b)
}

/// Build a MUD file from records.
///
/// ```rust,no_run
/// # fn main() -> Result<(), rubbl_mud::MudError> {
/// use rubbl_mud::{ContainerKind, MudWriter, Scaler};
///
/// let mut w = MudWriter::new(ContainerKind::TriumfTd);
/// w.push_scaler(Scaler {
///     label: Some("Forw".to_owned()),
///     count: Some(1000),
/// });
/// w.write_file("scalers.msr")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct MudWriter {
    kind: ContainerKind,
    run_description: Option<RunDescription>,
    comments: Vec<Comment>,
    histogram_format: HistogramFormat,
    histograms: Vec<Histogram>,
    scalers: Vec<Scaler>,
    independent_variables: Vec<IndependentVariable>,
}

impl MudWriter {
    pub fn new(kind: ContainerKind) -> Self {
        MudWriter {
            kind,
            run_description: None,
            comments: Vec::new(),
            histogram_format: HistogramFormat::default(),
            histograms: Vec::new(),
            scalers: Vec::new(),
            independent_variables: Vec::new(),
        }
    }

    pub fn run_description(&mut self, rd: RunDescription) -> &mut Self {
        self.run_description = Some(rd);
        self
    }

    /// Add a comment. Its number is its position in the list, whatever
    /// `number` says; the `prev` and `next` links are written as given.
    pub fn push_comment(&mut self, c: Comment) -> &mut Self {
        self.comments.push(c);
        self
    }

    pub fn histogram_format(&mut self, fmt: HistogramFormat) -> &mut Self {
        self.histogram_format = fmt;
        self
    }

    /// Add a histogram. Its number is its position in the list, and its bin
    /// count is the length of its data. Every histogram must have as many
    /// bins as the first, or `to_bytes()` fails.
    pub fn push_histogram(&mut self, h: Histogram) -> &mut Self {
        self.histograms.push(h);
        self
    }

    pub fn push_scaler(&mut self, s: Scaler) -> &mut Self {
        self.scalers.push(s);
        self
    }

    /// Add an independent variable. If any variable has a history, the
    /// variables are stored in an array-variant group.
    pub fn push_independent_variable(&mut self, v: IndependentVariable) -> &mut Self {
        self.independent_variables.push(v);
        self
    }

    fn histogram_group_kind(&self) -> u32 {
        match self.kind {
            ContainerKind::TriumfTd => GRP_TRI_TD_HIST,
            ContainerKind::TriumfTi => GRP_TRI_TI_HIST,
            ContainerKind::Other(_) => GRP_GEN_HIST,
        }
    }

    fn scaler_group_kind(&self) -> u32 {
        match self.kind {
            ContainerKind::TriumfTd => GRP_TRI_TD_SCALER,
            _ => GRP_GEN_SCALER,
        }
    }

    /// Encode the whole file.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MudError> {
        let mut top = Vec::new();

        if let Some(ref rd) = self.run_description {
            top.push(section_bytes(
                SEC_GEN_RUN_DESC,
                RUN_DESC_INSTANCE,
                &run_description_body(rd)?,
            ));
        }

        if !self.comments.is_empty() {
            let mut members = Vec::with_capacity(self.comments.len());

            for (i, c) in self.comments.iter().enumerate() {
                members.push(section_bytes(SEC_COMMENT, i as u32 + 1, &comment_body(c)?));
            }

            top.push(group_bytes(GRP_CMT, &members));
        }

        if let Some(first) = self.histograms.first() {
            let fmt = &self.histogram_format;
            let n_bins = first.data.len();
            let mut members = Vec::with_capacity(3 * self.histograms.len());

            for (i, h) in self.histograms.iter().enumerate() {
                let n = i as u32 + 1;

                if h.data.len() != n_bins {
                    return muderr!(
                        "histogram {n} has {} bins but histogram 1 has {n_bins}; all histograms \
                         of a run must be binned alike",
                        h.data.len()
                    );
                }

                members.push(section_bytes(
                    SEC_GEN_HIST_HDR,
                    n,
                    &histogram_header_body(fmt, h)?,
                ));
                members.push(section_bytes(
                    SEC_GEN_HIST_DAT,
                    n,
                    &histogram_data_body(fmt, h)?,
                ));

                if let Some(ref times) = h.time_data {
                    members.push(section_bytes(
                        SEC_GEN_HIST_TIME,
                        n,
                        &histogram_time_body(times)?,
                    ));
                }
            }

            top.push(group_bytes(self.histogram_group_kind(), &members));
        }

        if !self.scalers.is_empty() {
            let mut members = Vec::with_capacity(self.scalers.len());

            for (i, s) in self.scalers.iter().enumerate() {
                members.push(section_bytes(SEC_GEN_SCALER, i as u32 + 1, &scaler_body(s)?));
            }

            top.push(group_bytes(self.scaler_group_kind(), &members));
        }

        if !self.independent_variables.is_empty() {
            let arrays = self
                .independent_variables
                .iter()
                .any(|v| v.historical_data.is_some());
            let mut members = Vec::new();

            for (i, v) in self.independent_variables.iter().enumerate() {
                let n = i as u32 + 1;
                members.push(section_bytes(SEC_GEN_IND_VAR, n, &ind_var_body(v)?));

                match (&v.historical_data, &v.time_data) {
                    (Some(data), times) => {
                        let body = array_body(data, times.as_deref())?;
                        members.push(section_bytes(SEC_GEN_ARRAY, n, &body));
                    }

                    (None, Some(_)) => {
                        return muderr!("independent variable {n} has timestamps but no history");
                    }

                    (None, None) => {}
                }
            }

            let kind = if arrays {
                GRP_GEN_IND_VAR_ARR
            } else {
                GRP_GEN_IND_VAR
            };
            top.push(group_bytes(kind, &members));
        }

        let mut file = group_bytes(self.kind.id(), &top);
        file.extend_from_slice(&section_bytes(SEC_EOF, 0, &[]));
        Ok(file)
    }

    pub fn write_to<W: Write>(&self, mut dest: W) -> Result<(), MudError> {
        dest.write_all(&self.to_bytes()?)?;
        dest.flush()?;
        Ok(())
    }

    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<(), MudError> {
        let stream = io::BufWriter::new(File::create(path)?);
        self.write_to(stream)
    }
}
