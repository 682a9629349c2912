// Copyright 2024 Peter Williams and collaborators
// Licensed under the MIT License.

/*!

Histograms and the collection that gathers them.

Each histogram is stored as a header section and a data section, plus an
optional section of time data. The data section is a bare run of bin counts:
how many bins, and how wide each one is, must come from a header. MUD assumes
that every histogram in a run shares its binning, and by convention readers
take it from histogram #1. We do the same, and warn (without failing) if a
later header disagrees.

*/

use byteorder::{ByteOrder, LittleEndian};
use ndarray::Array2;
use rubbl_core::notify::NotificationBackend;
use rubbl_core::rn_warning;
use std::fmt;
use std::ops::Index;
use std::str::FromStr;

use crate::decode::FieldCursor;
use crate::numeric::ElementKind;
use crate::MudError;

/// One histogram of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    /// The 1-based number of this histogram.
    pub num: usize,

    /// Time zero, in picoseconds.
    pub t0_ps: Option<u32>,

    /// Time zero, as a bin index.
    pub t0_bin: Option<u32>,

    /// First and last bins of good data.
    pub good_bins: Option<(u32, u32)>,

    /// First and last bins of the background region.
    pub background_bins: Option<(u32, u32)>,

    pub n_events: Option<u32>,
    pub title: Option<String>,

    /// The bin counts. This always has `n_bins` entries, where `n_bins`
    /// comes from the owning collection.
    pub data: Vec<u32>,

    /// Time data attached to the histogram, if the file has any.
    pub time_data: Option<Vec<u32>>,
}

impl Histogram {
    fn matches_title(&self, title: &str) -> bool {
        match self.title {
            Some(ref t) => t.to_lowercase() == title.to_lowercase(),
            None => false,
        }
    }
}

/// The decoded contents of a histogram header section.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HistogramHeader {
    pub hist_type: Option<u32>,
    pub n_bytes: Option<u32>,
    pub n_bins: Option<u32>,
    pub bytes_per_bin: Option<u32>,
    pub fs_per_bin: Option<u32>,
    pub t0_ps: Option<u32>,
    pub t0_bin: Option<u32>,
    pub good_bin1: Option<u32>,
    pub good_bin2: Option<u32>,
    pub bkgd1: Option<u32>,
    pub bkgd2: Option<u32>,
    pub n_events: Option<u32>,
    pub title: Option<String>,
}

impl HistogramHeader {
    pub fn parse(body: &[u8], strsize: usize) -> (Self, Option<&'static str>) {
        let mut c = FieldCursor::new(body);

        let hdr = HistogramHeader {
            hist_type: c.u32("histogram type"),
            n_bytes: c.u32("byte count"),
            n_bins: c.u32("bin count"),
            bytes_per_bin: c.u32("bytes per bin"),
            fs_per_bin: c.u32("femtoseconds per bin"),
            t0_ps: c.u32("t0 (ps)"),
            t0_bin: c.u32("t0 bin"),
            good_bin1: c.u32("first good bin"),
            good_bin2: c.u32("last good bin"),
            bkgd1: c.u32("first background bin"),
            bkgd2: c.u32("last background bin"),
            n_events: c.u32("event count"),
            title: c.text("title", strsize),
        };

        (hdr, c.failed_at())
    }

    fn binning(&self) -> (Option<u32>, Option<u32>, Option<u32>) {
        (self.n_bins, self.bytes_per_bin, self.fs_per_bin)
    }
}

/// Decode a histogram time data section.
///
/// Like the other record decoders this is best-effort: a body too short for
/// the count it declares yields no time data, along with the name of the
/// field that could not be read.
pub fn decode_time_data(body: &[u8]) -> (Option<Vec<u32>>, Option<&'static str>) {
    let mut c = FieldCursor::new(body);

    let values = c
        .u32("time data count")
        .and_then(|n| c.bytes("time data", (n as usize).saturating_mul(4)))
        .map(|b| b.chunks(4).map(LittleEndian::read_u32).collect());

    (values, c.failed_at())
}

/// Convert a TDC bin-width code to seconds.
///
/// Codes below 16 select one of the standard TRIUMF TDC resolutions,
/// 0.078125 ns times a power of two. Larger values are a width in
/// femtoseconds.
pub fn seconds_per_bin(fs_per_bin: u32) -> f64 {
    if fs_per_bin < 16 {
        0.078125e-9 * 2f64.powi(fs_per_bin as i32)
    } else {
        fs_per_bin as f64 * 1e-15
    }
}

/// Decode the first *n_bins* unsigned counts of *bytes_per_bin* bytes each.
pub fn decode_bins(data: &[u8], n_bins: usize, bytes_per_bin: usize) -> Result<Vec<u32>, MudError> {
    if ![1, 2, 4].contains(&bytes_per_bin) {
        return Err(MudError::UnsupportedWidth {
            size: bytes_per_bin,
            kind: ElementKind::Integer,
        });
    }

    let expected = n_bins * bytes_per_bin;

    if data.len() < expected {
        return Err(MudError::LengthMismatch {
            expected,
            actual: data.len(),
        });
    }

    Ok(data[..expected]
        .chunks(bytes_per_bin)
        .map(|c| c.iter().rev().fold(0u32, |acc, &b| (acc << 8) | b as u32))
        .collect())
}

/// The key for looking up a histogram in a collection.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum HistKey {
    /// Match the 1-based histogram number.
    ByIndex(usize),

    /// Match the title, ignoring case.
    ByTitle(String),
}

impl From<usize> for HistKey {
    fn from(n: usize) -> Self {
        HistKey::ByIndex(n)
    }
}

impl<'a> From<&'a str> for HistKey {
    fn from(t: &'a str) -> Self {
        HistKey::ByTitle(t.to_owned())
    }
}

impl From<String> for HistKey {
    fn from(t: String) -> Self {
        HistKey::ByTitle(t)
    }
}

impl FromStr for HistKey {
    type Err = MudError;

    /// Text made only of digits is a histogram number; anything else is a
    /// title. Blank text is neither.
    fn from_str(s: &str) -> Result<Self, MudError> {
        let s = s.trim();

        if s.is_empty() {
            return Err(MudError::InvalidKey(s.to_owned()));
        }

        if s.bytes().all(|b| b.is_ascii_digit()) {
            match s.parse() {
                Ok(n) => Ok(HistKey::ByIndex(n)),
                Err(_) => Err(MudError::InvalidKey(s.to_owned())),
            }
        } else {
            Ok(HistKey::ByTitle(s.to_owned()))
        }
    }
}

impl fmt::Display for HistKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HistKey::ByIndex(n) => write!(f, "#{n}"),
            HistKey::ByTitle(t) => write!(f, "\"{t}\""),
        }
    }
}

/// The raw section bodies of one histogram.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HistogramSections {
    pub header: Vec<u8>,
    pub data: Vec<u8>,
    pub times: Option<Vec<u8>>,
}

/// All of the histograms of a run, along with their shared binning.
///
/// A collection always holds at least one histogram.
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramCollection {
    /// The instance number of the histogram group, which distinguishes
    /// TD-muSR from I-muSR histograms.
    pub kind: u32,
    pub hist_type: Option<u32>,
    pub n_bytes: Option<u32>,
    pub n_bins: usize,
    pub bytes_per_bin: usize,
    pub fs_per_bin: Option<u32>,
    pub seconds_per_bin: Option<f64>,
    histograms: Vec<Histogram>,
}

impl HistogramCollection {
    /// Assemble a collection from the sections of each histogram, in
    /// histogram order.
    ///
    /// Returns `Ok(None)` if there are no histograms. Binning comes from the
    /// first header; if it cannot be read there, no histogram data can be
    /// decoded and that is an error.
    pub fn assemble(
        kind: u32,
        sections: &[HistogramSections],
        strsize: usize,
        nb: &mut dyn NotificationBackend,
    ) -> Result<Option<Self>, MudError> {
        let mut headers = Vec::with_capacity(sections.len());

        for (i, secs) in sections.iter().enumerate() {
            let (hdr, failed_at) = HistogramHeader::parse(&secs.header, strsize);

            if let Some(field) = failed_at {
                rn_warning!(nb, "histogram {} header is incomplete: could not read its {}", i + 1, field);
            }

            headers.push(hdr);
        }

        let first = match headers.first() {
            Some(h) => h,
            None => return Ok(None),
        };

        let (n_bins, bytes_per_bin) = match (first.n_bins, first.bytes_per_bin) {
            (Some(n), Some(b)) => (n as usize, b as usize),
            _ => return muderr!("the binning of histogram 1 cannot be read"),
        };

        let mut histograms: Vec<Histogram> = Vec::with_capacity(sections.len());

        for (i, (hdr, secs)) in headers.iter().zip(sections).enumerate() {
            let num = i + 1;

            if hdr.binning() != first.binning() {
                rn_warning!(
                    nb,
                    "histogram {} has different binning than histogram 1; using that of histogram 1",
                    num
                );
            }

            let time_data = match secs.times {
                Some(ref body) => {
                    let (times, failed_at) = decode_time_data(body);

                    if let Some(field) = failed_at {
                        rn_warning!(
                            nb,
                            "histogram {} time data is incomplete: could not read its {}",
                            num,
                            field
                        );
                    }

                    times
                }

                None => None,
            };

            if let Some(ref title) = hdr.title {
                let earlier: Option<&Histogram> = histograms.iter().find(|h| h.matches_title(title));

                if let Some(earlier) = earlier {
                    rn_warning!(
                        nb,
                        "histograms {} and {} are both titled \"{}\"; look them up by number",
                        earlier.num,
                        num,
                        title
                    );
                }
            }

            histograms.push(Histogram {
                num,
                t0_ps: hdr.t0_ps,
                t0_bin: hdr.t0_bin,
                good_bins: hdr.good_bin1.zip(hdr.good_bin2),
                background_bins: hdr.bkgd1.zip(hdr.bkgd2),
                n_events: hdr.n_events,
                title: hdr.title.clone(),
                data: decode_bins(&secs.data, n_bins, bytes_per_bin)?,
                time_data,
            });
        }

        Ok(Some(HistogramCollection {
            kind,
            hist_type: first.hist_type,
            n_bytes: first.n_bytes,
            n_bins,
            bytes_per_bin,
            fs_per_bin: first.fs_per_bin,
            seconds_per_bin: first.fs_per_bin.map(seconds_per_bin),
            histograms,
        }))
    }

    /// Look up a histogram by number or by title.
    ///
    /// A title shared (ignoring case) by several histograms does not pick
    /// one of them; it fails with `MudError::AmbiguousKey`.
    pub fn get<K: Into<HistKey>>(&self, key: K) -> Result<&Histogram, MudError> {
        let key = key.into();

        let mut found: Vec<&Histogram> = match key {
            HistKey::ByIndex(n) => self.histograms.iter().filter(|h| h.num == n).collect(),
            HistKey::ByTitle(ref t) => self
                .histograms
                .iter()
                .filter(|h| h.matches_title(t))
                .collect(),
        };

        match found.len() {
            0 => Err(MudError::NotFound(key)),
            1 => Ok(found.remove(0)),
            count => Err(MudError::AmbiguousKey { key, count }),
        }
    }

    pub fn len(&self) -> usize {
        self.histograms.len()
    }

    /// A collection is never empty, so this is always false.
    pub fn is_empty(&self) -> bool {
        self.histograms.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Histogram> {
        self.histograms.iter()
    }

    pub fn into_histograms(self) -> Vec<Histogram> {
        self.histograms
    }

    /// All bin counts as a (histogram, bin) matrix.
    pub fn data_matrix(&self) -> Result<Array2<u32>, MudError> {
        let mut flat = Vec::with_capacity(self.histograms.len() * self.n_bins);

        for h in &self.histograms {
            flat.extend_from_slice(&h.data);
        }

        Ok(Array2::from_shape_vec(
            (self.histograms.len(), self.n_bins),
            flat,
        )?)
    }
}

impl<'a> IntoIterator for &'a HistogramCollection {
    type Item = &'a Histogram;
    type IntoIter = std::slice::Iter<'a, Histogram>;

    fn into_iter(self) -> Self::IntoIter {
        self.histograms.iter()
    }
}

impl Index<usize> for HistogramCollection {
    type Output = Histogram;

    fn index(&self, num: usize) -> &Histogram {
        match self.get(num) {
            Ok(h) => h,
            Err(e) => panic!("{}", e),
        }
    }
}

impl<'a> Index<&'a str> for HistogramCollection {
    type Output = Histogram;

    fn index(&self, title: &'a str) -> &Histogram {
        match self.get(title) {
            Ok(h) => h,
            Err(e) => panic!("{}", e),
        }
    }
}
