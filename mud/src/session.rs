// Copyright 2024 Peter Williams and collaborators
// Licensed under the MIT License.

/*!

Read sessions on MUD files.

A [`MudFile`] owns an open file and the directory parsed from it. Every query
seeks to the sections it needs and assembles a fresh record, so nothing that
is returned refers back to the session.

*/

use rubbl_core::io::ReadBlockAtExt;
use rubbl_core::notify::{
    BufferingNotificationBackend, NoopNotificationBackend, NotificationBackend, NotificationKind,
};
use rubbl_core::rn_warning;
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::directory::{Directory, FamilyInfo, SectionEntry};
use crate::format::{
    ContainerKind, Family, GRP_CMT, GRP_GEN_IND_VAR_ARR, SEC_GEN_ARRAY, SEC_GEN_HIST_DAT,
    SEC_GEN_HIST_TIME, SEC_GROUP,
};
use crate::histogram::{HistogramCollection, HistogramSections};
use crate::records::{
    assemble_comment, assemble_independent_variable, assemble_run_description, assemble_scaler,
    Comment, IndependentVariable, Measurement, RunDescription, Scaler,
};
use crate::MudError;

/// Buffer sizes below this risk cutting off ordinary text fields.
const SMALL_BUFFER_WARNING: usize = 32;

/// How a file is to be opened. Only reading is implemented.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OpenMode {
    Read,
    Write,
    ReadWrite,
}

impl FromStr for OpenMode {
    type Err = MudError;

    fn from_str(s: &str) -> Result<Self, MudError> {
        match s {
            "r" => Ok(OpenMode::Read),
            "w" => Ok(OpenMode::Write),
            "rw" | "r+" => Ok(OpenMode::ReadWrite),
            other => Err(MudError::InvalidConfig(format!("unknown open mode {other:?}"))),
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(match *self {
            OpenMode::Read => "r",
            OpenMode::Write => "w",
            OpenMode::ReadWrite => "rw",
        })
    }
}

/// Tunable limits on how much text is kept from each field.
///
/// Text fields keep at most one byte less than the buffer size, as if they
/// had been copied into a NUL-terminated buffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReadOptions {
    string_buffer_size: usize,
    comment_body_buffer_size: usize,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            string_buffer_size: 256,
            comment_body_buffer_size: 4096,
        }
    }
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the buffer size for ordinary text fields. Must be positive.
    pub fn with_string_buffer_size(mut self, size: usize) -> Result<Self, MudError> {
        if size == 0 {
            return Err(MudError::InvalidConfig(
                "the string buffer size must be positive".to_owned(),
            ));
        }

        self.string_buffer_size = size;
        Ok(self)
    }

    /// Set the buffer size for comment bodies. Must be positive.
    pub fn with_comment_body_buffer_size(mut self, size: usize) -> Result<Self, MudError> {
        if size == 0 {
            return Err(MudError::InvalidConfig(
                "the comment body buffer size must be positive".to_owned(),
            ));
        }

        self.comment_body_buffer_size = size;
        Ok(self)
    }

    pub fn string_buffer_size(&self) -> usize {
        self.string_buffer_size
    }

    pub fn comment_body_buffer_size(&self) -> usize {
        self.comment_body_buffer_size
    }
}

#[derive(Debug)]
struct OpenState {
    stream: BufReader<File>,
    dir: Directory,
}

/// An open MUD file.
///
/// The file is closed by `close()` or when the session is dropped. After
/// closing, and after any I/O error, every query fails with
/// `MudError::InvalidHandle`.
///
/// Problems that do not stop a query from answering (truncated records,
/// sections we do not understand) are collected as warnings. Hand them on
/// with `drain_notifications()`. Each problem is reported once per session,
/// however many times the affected record is read.
#[derive(Debug)]
pub struct MudFile {
    path: PathBuf,
    options: ReadOptions,
    state: Option<OpenState>,
    nb: BufferingNotificationBackend,
    reported: HashSet<(u32, u32)>,
}

impl MudFile {
    /// Open a file for reading with default options.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MudError> {
        Self::open_mode(path, OpenMode::Read)
    }

    pub fn open_mode<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self, MudError> {
        Self::open_with(path, mode, ReadOptions::default())
    }

    /// Open a file.
    ///
    /// Unsupported modes are rejected before the filesystem is touched. A
    /// path that does not exist gives `FileNotFound`; a file that exists but
    /// cannot be read as a MUD container gives `OpenFailed`.
    pub fn open_with<P: AsRef<Path>>(
        path: P,
        mode: OpenMode,
        options: ReadOptions,
    ) -> Result<Self, MudError> {
        if mode != OpenMode::Read {
            return Err(MudError::NotImplemented(mode.to_string()));
        }

        let path = path.as_ref().to_owned();

        if !path.exists() {
            return Err(MudError::FileNotFound(path));
        }

        let mut nb = BufferingNotificationBackend::new();

        let state = match Self::load(&path) {
            Ok(s) => s,
            Err(e) => {
                return Err(MudError::OpenFailed {
                    path,
                    source: Box::new(e),
                })
            }
        };

        if options.string_buffer_size < SMALL_BUFFER_WARNING {
            rn_warning!(
                nb,
                "string buffer size of {} bytes is likely to truncate text fields",
                options.string_buffer_size
            );
        }

        if options.comment_body_buffer_size < SMALL_BUFFER_WARNING {
            rn_warning!(
                nb,
                "comment body buffer size of {} bytes is likely to truncate comments",
                options.comment_body_buffer_size
            );
        }

        for entry in state.dir.unrecognized() {
            rn_warning!(
                nb,
                "{}: ignoring unrecognized section {:#010x} (instance {:#x})",
                path.display(),
                entry.sec_id,
                entry.instance
            );
        }

        Ok(MudFile {
            path,
            options,
            state: Some(state),
            nb,
            reported: HashSet::new(),
        })
    }

    fn load(path: &Path) -> Result<OpenState, MudError> {
        let mut stream = BufReader::new(File::open(path)?);
        let dir = Directory::read(&mut stream)?;
        Ok(OpenState { stream, dir })
    }

    /// Close the file. Closing an already-closed session does nothing.
    pub fn close(&mut self) {
        self.state = None;
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    /// The warnings collected so far, as `(kind, text)` pairs.
    pub fn notifications(&self) -> impl Iterator<Item = (NotificationKind, &str)> {
        self.nb.messages()
    }

    /// Send the collected warnings to another backend, emptying our buffer.
    pub fn drain_notifications<B: NotificationBackend + ?Sized>(&mut self, dest: &mut B) {
        std::mem::take(&mut self.nb).drain(dest);
    }

    fn dir(&self) -> Result<&Directory, MudError> {
        match self.state {
            Some(ref s) => Ok(&s.dir),
            None => Err(MudError::InvalidHandle),
        }
    }

    /// Read the body of a section. An I/O failure here closes the session,
    /// since nothing more can be trusted about the file.
    fn read_body(&mut self, entry: &SectionEntry) -> Result<Vec<u8>, MudError> {
        let state = match self.state {
            Some(ref mut s) => s,
            None => return Err(MudError::InvalidHandle),
        };

        match state
            .stream
            .read_block_at(entry.body_offset, entry.size as usize)
        {
            Ok(b) => Ok(b),
            Err(e) => {
                self.state = None;
                Err(e.into())
            }
        }
    }

    /// Whether this is the first problem found with the section (or thread)
    /// identified by *key*.
    fn first_report(&mut self, key: (u32, u32)) -> bool {
        self.reported.insert(key)
    }

    fn note_degraded(
        &mut self,
        entry: &SectionEntry,
        what: fmt::Arguments,
        failed_at: Option<&'static str>,
    ) {
        if let Some(field) = failed_at {
            if !self.first_report((entry.sec_id, entry.instance)) {
                return;
            }

            rn_warning!(
                self.nb,
                "{}: {} is incomplete; could not read its {} field",
                self.path.display(),
                what,
                field
            );
        }
    }

    pub fn container_kind(&self) -> Result<ContainerKind, MudError> {
        Ok(self.dir()?.container_kind())
    }

    /// The raw format identifier of the container.
    pub fn format_id(&self) -> Result<u32, MudError> {
        Ok(self.container_kind()?.id())
    }

    pub fn family_info(&self, family: Family) -> Result<FamilyInfo, MudError> {
        Ok(self.dir()?.family_info(family))
    }

    /// The run description, or `None` if the file has none.
    pub fn get_run_description(&mut self) -> Result<Option<RunDescription>, MudError> {
        let entry = match self.dir()?.run_description() {
            Some(e) => *e,
            None => return Ok(None),
        };

        let body = self.read_body(&entry)?;
        let (rd, failed_at) = assemble_run_description(&body, self.options.string_buffer_size);
        self.note_degraded(&entry, format_args!("the run description"), failed_at);
        Ok(Some(rd))
    }

    pub fn get_subtitle(&mut self) -> Result<Option<String>, MudError> {
        Ok(self.get_run_description()?.and_then(|rd| rd.subtitle))
    }

    /// The three fixed header comment slots.
    pub fn get_header_comments(&mut self) -> Result<[Option<String>; 3], MudError> {
        Ok(self
            .get_run_description()?
            .map(|rd| rd.header_comments)
            .unwrap_or_default())
    }

    pub fn get_temperature(&mut self) -> Result<Option<Measurement>, MudError> {
        Ok(self
            .get_run_description()?
            .and_then(|rd| rd.temperature_measurement()))
    }

    pub fn get_field(&mut self) -> Result<Option<Measurement>, MudError> {
        Ok(self
            .get_run_description()?
            .and_then(|rd| rd.field_measurement()))
    }

    /// Comment *n*, counting from 1.
    pub fn get_comment(&mut self, n: usize) -> Result<Comment, MudError> {
        let (_, entry) = self.dir()?.locate(Family::Comments, n)?;
        let entry = *entry;
        let body = self.read_body(&entry)?;
        let (c, failed_at) = assemble_comment(
            n,
            &body,
            self.options.string_buffer_size,
            self.options.comment_body_buffer_size,
        );
        self.note_degraded(&entry, format_args!("comment {n}"), failed_at);
        Ok(c)
    }

    /// All comments in storage order.
    pub fn get_comments(&mut self) -> Result<Vec<Comment>, MudError> {
        let count = self.family_info(Family::Comments)?.count;
        (1..=count).map(|n| self.get_comment(n)).collect()
    }

    /// Follow the `next` links starting from comment *start*.
    ///
    /// The walk stops at a comment with no successor, at a link that points
    /// outside the list, or when it comes back to a comment already visited.
    pub fn comment_thread(&mut self, start: usize) -> Result<Vec<Comment>, MudError> {
        let count = self.family_info(Family::Comments)?.count;
        let mut seen = HashSet::new();
        let mut thread = Vec::new();
        let mut cur = Some(start);

        while let Some(n) = cur {
            if !seen.insert(n) {
                if self.first_report((GRP_CMT, start as u32)) {
                    rn_warning!(self.nb, "comment thread starting at {} loops back to {}", start, n);
                }
                break;
            }

            if !thread.is_empty() && n > count {
                if self.first_report((GRP_CMT, start as u32)) {
                    rn_warning!(
                        self.nb,
                        "comment thread starting at {} links to nonexistent comment {}",
                        start,
                        n
                    );
                }
                break;
            }

            let c = self.get_comment(n)?;
            cur = c.next;
            thread.push(c);
        }

        Ok(thread)
    }

    /// Scaler *n*, counting from 1.
    pub fn get_scaler(&mut self, n: usize) -> Result<Scaler, MudError> {
        let (_, entry) = self.dir()?.locate(Family::Scalers, n)?;
        let entry = *entry;
        let body = self.read_body(&entry)?;
        let (s, failed_at) = assemble_scaler(&body, self.options.string_buffer_size);
        self.note_degraded(&entry, format_args!("scaler {n}"), failed_at);
        Ok(s)
    }

    pub fn get_scalers(&mut self) -> Result<Vec<Scaler>, MudError> {
        let count = self.family_info(Family::Scalers)?.count;
        (1..=count).map(|n| self.get_scaler(n)).collect()
    }

    /// Independent variable *n*, counting from 1.
    pub fn get_independent_variable(&mut self, n: usize) -> Result<IndependentVariable, MudError> {
        let (group, entry) = self.dir()?.locate(Family::IndependentVariables, n)?;
        let entry = *entry;

        let array_entry = if group.kind == GRP_GEN_IND_VAR_ARR {
            group.find(SEC_GEN_ARRAY, n as u32).copied()
        } else {
            None
        };

        let body = self.read_body(&entry)?;

        let array = match array_entry {
            Some(ref e) => Some(self.read_body(e)?),
            None => None,
        };

        let (v, failed_at) =
            assemble_independent_variable(&body, array.as_deref(), self.options.string_buffer_size)?;
        self.note_degraded(&entry, format_args!("independent variable {n}"), failed_at);
        Ok(v)
    }

    pub fn get_independent_variables(&mut self) -> Result<Vec<IndependentVariable>, MudError> {
        let count = self.family_info(Family::IndependentVariables)?.count;
        (1..=count).map(|n| self.get_independent_variable(n)).collect()
    }

    /// All histograms, or `None` if the file has none.
    pub fn get_histograms(&mut self) -> Result<Option<HistogramCollection>, MudError> {
        let info = self.family_info(Family::Histograms)?;

        let kind = match info.kind {
            Some(k) if info.count > 0 => k,
            _ => return Ok(None),
        };

        let mut entries = Vec::with_capacity(info.count);

        for n in 1..=info.count {
            let (group, hdr) = self.dir()?.locate(Family::Histograms, n)?;

            let dat = match group.find(SEC_GEN_HIST_DAT, n as u32) {
                Some(d) => *d,
                None => return muderr!("histogram {n} has a header but no data"),
            };

            let times = group.find(SEC_GEN_HIST_TIME, n as u32).copied();
            entries.push((*hdr, dat, times));
        }

        let mut sections = Vec::with_capacity(entries.len());

        for (hdr, dat, times) in &entries {
            let times = match times {
                Some(t) => Some(self.read_body(t)?),
                None => None,
            };

            sections.push(HistogramSections {
                header: self.read_body(hdr)?,
                data: self.read_body(dat)?,
                times,
            });
        }

        let strsize = self.options.string_buffer_size;

        if self.first_report((SEC_GROUP, kind)) {
            HistogramCollection::assemble(kind, &sections, strsize, &mut self.nb)
        } else {
            HistogramCollection::assemble(kind, &sections, strsize, &mut NoopNotificationBackend::new())
        }
    }
}

impl Drop for MudFile {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{
        group_bytes, histogram_data_body, histogram_header_body, section_bytes, HistogramFormat,
        MudWriter,
    };
    use crate::format::*;
    use crate::histogram::Histogram;
    use crate::records::HistoricalData;

    fn warnings(mf: &MudFile) -> Vec<String> {
        mf.notifications()
            .filter(|(k, _)| *k == NotificationKind::Warning)
            .map(|(_, t)| t.to_owned())
            .collect()
    }

    fn text(s: &str) -> Option<String> {
        Some(s.to_owned())
    }

    fn sample_writer() -> MudWriter {
        let mut w = MudWriter::new(ContainerKind::TriumfTd);

        w.run_description(RunDescription {
            run_number: Some(6523),
            temperature: text("295.0K"),
            field: text("1000 G"),
            subtitle: text("Run A"),
            header_comments: [text("Beam tuned"), None, text("Sample remounted")],
            ..RunDescription::default()
        });

        w.push_scaler(Scaler {
            label: text("Forw"),
            count: Some(1000),
        })
        .push_scaler(Scaler {
            label: text("Back"),
            count: Some(950),
        });

        w.histogram_format(HistogramFormat::new(1, 4, 3))
            .push_histogram(Histogram {
                num: 1,
                t0_ps: Some(1000),
                t0_bin: Some(1),
                good_bins: Some((1, 3)),
                background_bins: None,
                n_events: Some(100),
                title: text("Forw"),
                data: vec![10, 20, 30, 40],
                time_data: Some(vec![0, 1, 2, 3]),
            });

        for (n, next) in &[(1, Some(3)), (2, None), (3, Some(1))] {
            w.push_comment(Comment {
                number: *n,
                prev: None,
                next: *next,
                time: Some(1000 + *n as u32),
                author: text("pkgw"),
                title: text(&format!("note {n}")),
                body: text("Looks fine."),
            });
        }

        w.push_independent_variable(IndependentVariable {
            mean: Some(295.0),
            name: text("Sample T"),
            units: text("K"),
            historical_data: Some(HistoricalData::Integer(vec![294, 296])),
            time_data: Some(vec![0, 60]),
            ..IndependentVariable::default()
        })
        .push_independent_variable(IndependentVariable {
            mean: Some(1.0),
            name: text("Field"),
            ..IndependentVariable::default()
        });

        w
    }

    fn sample_file() -> tempfile::NamedTempFile {
        let f = tempfile::NamedTempFile::new().unwrap();
        sample_writer().write_file(f.path()).unwrap();
        f
    }

    #[test]
    fn subtitle_and_header_comments() {
        let f = sample_file();
        let mut mf = MudFile::open(f.path()).unwrap();
        assert_eq!(mf.container_kind().unwrap(), ContainerKind::TriumfTd);
        assert_eq!(mf.format_id().unwrap(), FMT_TRI_TD);
        assert_eq!(mf.get_subtitle().unwrap().as_deref(), Some("Run A"));
        assert_eq!(
            mf.get_header_comments().unwrap(),
            [text("Beam tuned"), None, text("Sample remounted")]
        );

        let t = mf.get_temperature().unwrap().unwrap();
        assert_eq!(t.value, Some(295.0));
        let b = mf.get_field().unwrap().unwrap();
        assert_eq!(b.units.as_deref(), Some("G"));
    }

    #[test]
    fn scalers_in_file_order() {
        let f = sample_file();
        let mut mf = MudFile::open(f.path()).unwrap();
        let pairs: Vec<_> = mf
            .get_scalers()
            .unwrap()
            .into_iter()
            .map(|s| (s.label.unwrap(), s.count.unwrap()))
            .collect();
        assert_eq!(pairs, vec![("Forw".to_owned(), 1000), ("Back".to_owned(), 950)]);
        assert_eq!(mf.get_scaler(2).unwrap().label.as_deref(), Some("Back"));
        assert!(matches!(
            mf.get_scaler(0),
            Err(MudError::IndexOutOfRange { family: Family::Scalers, index: 0, count: 2 })
        ));
        assert!(matches!(mf.get_scaler(3), Err(MudError::IndexOutOfRange { .. })));

        // A caller error leaves the session usable.
        assert_eq!(mf.get_scaler(1).unwrap().count, Some(1000));
    }

    #[test]
    fn histogram_by_number_and_title() {
        let f = sample_file();
        let mut mf = MudFile::open(f.path()).unwrap();
        let hists = mf.get_histograms().unwrap().unwrap();
        assert_eq!(hists[1].data, vec![10, 20, 30, 40]);
        assert_eq!(hists["forw"].data, vec![10, 20, 30, 40]);
        assert_eq!(hists.kind, GRP_TRI_TD_HIST);
        assert_eq!(hists.seconds_per_bin, Some(0.625e-9));
        assert_eq!(hists[1].time_data, Some(vec![0, 1, 2, 3]));
        assert_eq!(mf.family_info(Family::Histograms).unwrap().count, 1);
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.msr");
        assert!(matches!(MudFile::open(&path), Err(MudError::FileNotFound(p)) if p == path));
    }

    #[test]
    fn not_a_mud_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut f, b"SIMPLE  =                    T").unwrap();

        match MudFile::open(f.path()) {
            Err(e @ MudError::OpenFailed { .. }) => assert!(e.is_session_fatal()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn only_reading_is_implemented() {
        // Checked before the path is looked at.
        for mode in &["w", "rw", "r+"] {
            let mode: OpenMode = mode.parse().unwrap();
            assert!(matches!(
                MudFile::open_mode("/nonexistent/file.msr", mode),
                Err(MudError::NotImplemented(_))
            ));
        }

        assert!(matches!("a".parse::<OpenMode>(), Err(MudError::InvalidConfig(_))));
    }

    #[test]
    fn lifecycle() {
        let f = sample_file();
        let mut mf = MudFile::open(f.path()).unwrap();
        assert!(mf.is_open());
        mf.close();
        mf.close();
        assert!(!mf.is_open());
        assert!(matches!(mf.get_subtitle(), Err(MudError::InvalidHandle)));
        assert!(matches!(mf.get_scalers(), Err(MudError::InvalidHandle)));
        assert!(matches!(mf.get_histograms(), Err(MudError::InvalidHandle)));
        assert!(matches!(mf.family_info(Family::Comments), Err(MudError::InvalidHandle)));

        let mut again = MudFile::open(f.path()).unwrap();
        assert_eq!(again.get_subtitle().unwrap().as_deref(), Some("Run A"));
        assert!(matches!(mf.get_subtitle(), Err(MudError::InvalidHandle)));
    }

    #[test]
    fn comments_and_threads() {
        let f = sample_file();
        let mut mf = MudFile::open(f.path()).unwrap();
        let all = mf.get_comments().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1].title.as_deref(), Some("note 2"));
        assert_eq!(all[0].next, Some(3));
        assert_eq!(all[1].next, None);

        let thread: Vec<usize> = mf
            .comment_thread(1)
            .unwrap()
            .iter()
            .map(|c| c.number)
            .collect();
        assert_eq!(thread, vec![1, 3]);
        assert_eq!(warnings(&mf).len(), 1);

        let mut sink = BufferingNotificationBackend::new();
        mf.drain_notifications(&mut sink);
        assert_eq!(sink.len(), 1);
        assert_eq!(mf.notifications().count(), 0);

        assert_eq!(mf.comment_thread(2).unwrap().len(), 1);
        assert!(matches!(mf.comment_thread(4), Err(MudError::IndexOutOfRange { .. })));
    }

    #[test]
    fn independent_variables() {
        let f = sample_file();
        let mut mf = MudFile::open(f.path()).unwrap();
        let vars = mf.get_independent_variables().unwrap();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].historical_data, Some(HistoricalData::Integer(vec![294, 296])));
        assert_eq!(vars[0].time_data, Some(vec![0, 60]));
        assert_eq!(vars[1].name.as_deref(), Some("Field"));
        assert_eq!(vars[1].historical_data, None);
        assert_eq!(vars[1].time_data, None);
    }

    #[test]
    fn scalar_group_ignores_stray_arrays() {
        let mut var = Vec::new();
        for x in &[1.0f64, 2.0, 1.5, 0.1, 0.0] {
            var.extend_from_slice(&x.to_le_bytes());
        }
        var.extend_from_slice(&[0; 6]);

        let stray = crate::encode::array_body(&HistoricalData::Real(vec![1.0]), Some(&[7u32][..]))
            .unwrap();
        let ivars = group_bytes(
            GRP_GEN_IND_VAR,
            &[
                section_bytes(SEC_GEN_IND_VAR, 1, &var),
                section_bytes(SEC_GEN_ARRAY, 1, &stray),
            ],
        );
        let data = group_bytes(FMT_TRI_TI, &[ivars]);

        let mut f = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut f, &data).unwrap();

        let mut mf = MudFile::open(f.path()).unwrap();
        let v = mf.get_independent_variable(1).unwrap();
        assert_eq!(v.mean, Some(1.5));
        assert_eq!(v.historical_data, None);
        assert_eq!(v.time_data, None);
        assert!(mf.get_run_description().unwrap().is_none());
        assert_eq!(mf.get_subtitle().unwrap(), None);
        assert!(mf.get_histograms().unwrap().is_none());
        assert!(mf.get_comments().unwrap().is_empty());
    }

    #[test]
    fn small_buffers() {
        assert!(matches!(
            ReadOptions::new().with_string_buffer_size(0),
            Err(MudError::InvalidConfig(_))
        ));
        assert!(ReadOptions::new().with_comment_body_buffer_size(0).is_err());

        let f = sample_file();
        let opts = ReadOptions::new().with_string_buffer_size(4).unwrap();
        let mut mf = MudFile::open_with(f.path(), OpenMode::Read, opts).unwrap();
        assert_eq!(warnings(&mf).len(), 1);
        assert_eq!(mf.get_subtitle().unwrap().as_deref(), Some("Run"));
    }

    #[test]
    fn truncated_record_is_reported() {
        let mut body = Vec::new();
        body.extend_from_slice(&123u32.to_le_bytes());
        body.extend_from_slice(&[5, 0, b'F']);
        let scalers = group_bytes(GRP_GEN_SCALER, &[section_bytes(SEC_GEN_SCALER, 1, &body)]);
        let extra = section_bytes(0x0200_0001, 1, b"?");
        let data = group_bytes(FMT_TRI_TD, &[scalers, extra]);

        let mut f = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut f, &data).unwrap();

        let mut mf = MudFile::open(f.path()).unwrap();
        assert_eq!(warnings(&mf).len(), 1);

        let s = mf.get_scaler(1).unwrap();
        assert_eq!(s.count, Some(123));
        assert_eq!(s.label, None);
        assert_eq!(warnings(&mf).len(), 2);
        assert!(warnings(&mf)[1].contains("label"));
    }

    #[test]
    fn repeated_reads_warn_once() {
        let rd = section_bytes(SEC_GEN_RUN_DESC, RUN_DESC_INSTANCE, &[1, 0, 0, 0]);

        let fmt = HistogramFormat::new(1, 4, 3);
        let hist = |title: &str, data: Vec<u32>| Histogram {
            num: 0,
            t0_ps: None,
            t0_bin: None,
            good_bins: None,
            background_bins: None,
            n_events: None,
            title: text(title),
            data,
            time_data: None,
        };
        let h1 = hist("Forw", vec![1, 2]);
        let h2 = hist("Back", vec![3, 4]);
        let other_fmt = HistogramFormat::new(1, 4, 4);
        let hists = group_bytes(
            GRP_TRI_TD_HIST,
            &[
                section_bytes(SEC_GEN_HIST_HDR, 1, &histogram_header_body(&fmt, &h1).unwrap()),
                section_bytes(SEC_GEN_HIST_DAT, 1, &histogram_data_body(&fmt, &h1).unwrap()),
                section_bytes(SEC_GEN_HIST_HDR, 2, &histogram_header_body(&other_fmt, &h2).unwrap()),
                section_bytes(SEC_GEN_HIST_DAT, 2, &histogram_data_body(&other_fmt, &h2).unwrap()),
            ],
        );
        let data = group_bytes(FMT_TRI_TD, &[rd, hists]);

        let mut f = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut f, &data).unwrap();

        let mut mf = MudFile::open(f.path()).unwrap();
        assert!(warnings(&mf).is_empty());

        for _ in 0..1000 {
            assert_eq!(mf.get_subtitle().unwrap(), None);
        }

        assert_eq!(mf.get_run_description().unwrap().unwrap().experiment_number, Some(1));
        assert_eq!(warnings(&mf).len(), 1);

        for _ in 0..10 {
            assert_eq!(mf.get_histograms().unwrap().unwrap()[2].data, vec![3, 4]);
        }

        assert_eq!(warnings(&mf).len(), 2);
    }

    #[test]
    fn sessions_are_independent_across_threads() {
        let f = sample_file();
        let path = f.path().to_owned();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let mut mf = MudFile::open(&path).unwrap();
                    mf.get_scalers().unwrap().len()
                })
            })
            .collect();

        for h in handles {
            assert_eq!(h.join().unwrap(), 2);
        }
    }
}
