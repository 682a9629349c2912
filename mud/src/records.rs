// Copyright 2024 Peter Williams and collaborators
// Licensed under the MIT License.

/*!

The records stored in a MUD container, and how they are assembled from
section bodies.

Assembly is best-effort. Each assembler walks its section body with a
`FieldCursor`; if the body is short, the fields that could not be read come
back as `None` and the rest of the record is still returned. The assemblers
report the first field that failed so that the caller can warn about it.

Histograms live in their own module since they are gathered into a
collection.

*/

use crate::decode::{decode_text, split_value_units, FieldCursor};
use crate::format::HistoricalDataType;
use crate::numeric::{ElementKind, NumericArray, NumericLayout};
use crate::MudError;

/// A record together with the name of the first field that could not be
/// decoded, if any.
pub type Assembly<T> = (T, Option<&'static str>);

/// The description of a run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunDescription {
    pub experiment_number: Option<u32>,
    pub run_number: Option<u32>,

    /// Start of the run, in seconds since the Unix epoch.
    pub time_begin: Option<u32>,

    /// End of the run, in seconds since the Unix epoch.
    pub time_end: Option<u32>,

    pub elapsed_seconds: Option<u32>,
    pub title: Option<String>,
    pub lab: Option<String>,
    pub area: Option<String>,
    pub method: Option<String>,
    pub apparatus: Option<String>,
    pub insert: Option<String>,
    pub sample: Option<String>,
    pub orientation: Option<String>,
    pub das: Option<String>,
    pub experimenters: Option<String>,

    /// The sample temperature, as free text with units.
    pub temperature: Option<String>,

    /// The applied field, as free text with units.
    pub field: Option<String>,

    pub subtitle: Option<String>,

    /// The three fixed header comment slots. These are unrelated to the
    /// indexed comment list.
    pub header_comments: [Option<String>; 3],

    /// The non-blank header comments joined with newlines.
    pub comments: Option<String>,
}

impl RunDescription {
    pub fn temperature_measurement(&self) -> Option<Measurement> {
        self.temperature.as_deref().map(Measurement::parse)
    }

    pub fn field_measurement(&self) -> Option<Measurement> {
        self.field.as_deref().map(Measurement::parse)
    }
}

/// A value-with-units string such as a temperature or field setting.
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    pub raw: String,
    pub value: Option<f64>,
    pub units: Option<String>,
}

impl Measurement {
    pub fn parse(raw: &str) -> Self {
        let (value, units) = split_value_units(raw);

        Measurement {
            raw: raw.to_owned(),
            value,
            units,
        }
    }
}

/// One entry in the indexed comment list.
///
/// Comments form chains through their `prev` and `next` links, which are
/// independent of the order in which they are stored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Comment {
    /// The 1-based index of this comment in the file.
    pub number: usize,
    pub prev: Option<usize>,
    pub next: Option<usize>,

    /// When the comment was made, in seconds since the Unix epoch.
    pub time: Option<u32>,

    pub author: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scaler {
    pub label: Option<String>,
    pub count: Option<u32>,
}

/// The recorded history of an independent variable over the run.
#[derive(Clone, Debug, PartialEq)]
pub enum HistoricalData {
    Integer(Vec<i64>),
    Real(Vec<f64>),
    Text(Vec<Option<String>>),
}

impl HistoricalData {
    pub fn len(&self) -> usize {
        match self {
            HistoricalData::Integer(v) => v.len(),
            HistoricalData::Real(v) => v.len(),
            HistoricalData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> HistoricalDataType {
        match self {
            HistoricalData::Integer(_) => HistoricalDataType::Integer,
            HistoricalData::Real(_) => HistoricalDataType::Real,
            HistoricalData::Text(_) => HistoricalDataType::Text,
        }
    }
}

impl From<NumericArray> for HistoricalData {
    fn from(a: NumericArray) -> Self {
        match a {
            NumericArray::Integer(v) => HistoricalData::Integer(v),
            NumericArray::Real(v) => HistoricalData::Real(v),
        }
    }
}

/// A quantity monitored during the run, such as a temperature.
///
/// The history and its timestamps are only ever present for variables stored
/// in an array-variant group, and `time_data`, when present, has as many
/// entries as `historical_data`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndependentVariable {
    pub low: Option<f64>,
    pub high: Option<f64>,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub skewness: Option<f64>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub units: Option<String>,
    pub historical_data: Option<HistoricalData>,

    /// Sample times of the history, in seconds since the Unix epoch.
    pub time_data: Option<Vec<u32>>,
}

pub fn assemble_run_description(body: &[u8], strsize: usize) -> Assembly<RunDescription> {
    let mut c = FieldCursor::new(body);

    let mut rd = RunDescription {
        experiment_number: c.u32("experiment number"),
        run_number: c.u32("run number"),
        time_begin: c.u32("start time"),
        time_end: c.u32("end time"),
        elapsed_seconds: c.u32("elapsed time"),
        title: c.text("title", strsize),
        lab: c.text("lab", strsize),
        area: c.text("area", strsize),
        method: c.text("method", strsize),
        apparatus: c.text("apparatus", strsize),
        insert: c.text("insert", strsize),
        sample: c.text("sample", strsize),
        orientation: c.text("orientation", strsize),
        das: c.text("DAS", strsize),
        experimenters: c.text("experimenters", strsize),
        temperature: c.text("temperature", strsize),
        field: c.text("field", strsize),
        subtitle: c.text("subtitle", strsize),
        header_comments: [
            c.text("comment 1", strsize),
            c.text("comment 2", strsize),
            c.text("comment 3", strsize),
        ],
        comments: None,
    };

    let present: Vec<&str> = rd.header_comments.iter().flatten().map(|s| s.as_str()).collect();

    if !present.is_empty() {
        rd.comments = Some(present.join("\n"));
    }

    (rd, c.failed_at())
}

fn link(v: Option<u32>) -> Option<usize> {
    match v {
        Some(0) | None => None,
        Some(n) => Some(n as usize),
    }
}

pub fn assemble_comment(
    number: usize,
    body: &[u8],
    strsize: usize,
    body_size: usize,
) -> Assembly<Comment> {
    let mut c = FieldCursor::new(body);

    let comment = Comment {
        number,
        prev: link(c.u32("previous link")),
        next: link(c.u32("next link")),
        time: c.u32("time"),
        author: c.text("author", strsize),
        title: c.text("title", strsize),
        body: c.text("body", body_size),
    };

    (comment, c.failed_at())
}

pub fn assemble_scaler(body: &[u8], strsize: usize) -> Assembly<Scaler> {
    let mut c = FieldCursor::new(body);

    let scaler = Scaler {
        count: c.u32("count"),
        label: c.text("label", strsize),
    };

    (scaler, c.failed_at())
}

/// Assemble an independent variable.
///
/// *array* is the body of the companion array section, and must be `None`
/// for variables in a scalar-variant group: such variables never have a
/// history, whatever the file might contain. For the array variant, a
/// missing or unreadable array header leaves both the history and the time
/// data absent. An element width that no layout matches, or a payload too
/// short for its declared element count, is an error.
pub fn assemble_independent_variable(
    body: &[u8],
    array: Option<&[u8]>,
    strsize: usize,
) -> Result<Assembly<IndependentVariable>, MudError> {
    let mut c = FieldCursor::new(body);

    let mut var = IndependentVariable {
        low: c.f64("low"),
        high: c.f64("high"),
        mean: c.f64("mean"),
        std_dev: c.f64("standard deviation"),
        skewness: c.f64("skewness"),
        name: c.text("name", strsize),
        description: c.text("description", strsize),
        units: c.text("units", strsize),
        historical_data: None,
        time_data: None,
    };

    let mut failed_at = c.failed_at();

    if let Some(array) = array {
        let (history, times, array_failed) = decode_history(array, strsize)?;
        var.historical_data = history;
        var.time_data = times;
        failed_at = failed_at.or(array_failed);
    }

    Ok((var, failed_at))
}

type History = (
    Option<HistoricalData>,
    Option<Vec<u32>>,
    Option<&'static str>,
);

fn decode_history(array: &[u8], strsize: usize) -> Result<History, MudError> {
    let mut c = FieldCursor::new(array);

    let num = c.u32("history length");
    let elem_size = c.u32("history element size");
    let data_type = c.u32("history data type");
    let has_time = c.u32("history time flag");
    let n_bytes = c.u32("history byte count");

    let data_type = data_type.and_then(HistoricalDataType::try_from_u32);

    let (num, elem_size, data_type, has_time, n_bytes) =
        match (num, elem_size, data_type, has_time, n_bytes) {
            (Some(a), Some(b), Some(t), Some(h), Some(n)) if b > 0 => {
                (a as usize, b as usize, t, h != 0, n as usize)
            }
            _ => return Ok((None, None, c.failed_at())),
        };

    let payload = match c.bytes("history data", n_bytes) {
        Some(p) => p,
        None => return Ok((None, None, c.failed_at())),
    };

    let history: HistoricalData = match data_type {
        HistoricalDataType::Integer => {
            NumericLayout::resolve(elem_size, ElementKind::Integer)?.decode(payload, num)?.into()
        }

        HistoricalDataType::Real => {
            NumericLayout::resolve(elem_size, ElementKind::Real)?.decode(payload, num)?.into()
        }

        HistoricalDataType::Text => {
            let expected = num * elem_size;

            if payload.len() < expected {
                return Err(MudError::LengthMismatch {
                    expected,
                    actual: payload.len(),
                });
            }

            HistoricalData::Text(
                payload[..expected]
                    .chunks(elem_size)
                    .map(|s| decode_text(s, strsize))
                    .collect(),
            )
        }
    };

    let mut times = None;

    if has_time {
        times = (0..num)
            .map(|_| c.u32("history times"))
            .collect::<Option<Vec<u32>>>();
    }

    Ok((Some(history), times, c.failed_at()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{array_body, comment_body, ind_var_body, run_description_body};

    fn sample_run() -> RunDescription {
        RunDescription {
            experiment_number: Some(1002),
            run_number: Some(6523),
            time_begin: Some(1_100_000_000),
            time_end: Some(1_100_003_600),
            elapsed_seconds: Some(3600),
            title: Some("Ag foil".to_owned()),
            temperature: Some("295.0K".to_owned()),
            field: Some("1000 G".to_owned()),
            subtitle: Some("Run A".to_owned()),
            header_comments: [Some("first".to_owned()), None, Some("third".to_owned())],
            ..RunDescription::default()
        }
    }

    #[test]
    fn run_description() {
        let body = run_description_body(&sample_run()).unwrap();
        let (rd, failed) = assemble_run_description(&body, 256);
        assert_eq!(failed, None);
        assert_eq!(rd.run_number, Some(6523));
        assert_eq!(rd.lab, None);
        assert_eq!(rd.subtitle.as_deref(), Some("Run A"));
        assert_eq!(rd.header_comments[1], None);
        assert_eq!(rd.comments.as_deref(), Some("first\nthird"));

        let t = rd.temperature_measurement().unwrap();
        assert_eq!(t.value, Some(295.0));
        assert_eq!(t.units.as_deref(), Some("K"));
    }

    #[test]
    fn truncated_run_description_degrades() {
        let body = run_description_body(&sample_run()).unwrap();
        // Cut into the title: the numbers survive, all the text is lost.
        let (rd, failed) = assemble_run_description(&body[..24], 256);
        assert_eq!(failed, Some("title"));
        assert_eq!(rd.elapsed_seconds, Some(3600));
        assert_eq!(rd.title, None);
        assert_eq!(rd.subtitle, None);
        assert_eq!(rd.comments, None);
    }

    #[test]
    fn comment_links() {
        let c = Comment {
            number: 2,
            prev: Some(1),
            next: None,
            time: Some(5),
            author: Some("pkgw".to_owned()),
            title: Some("Beam off".to_owned()),
            body: Some("Cyclotron trip at 12:05.".to_owned()),
        };
        let body = comment_body(&c).unwrap();
        let (decoded, failed) = assemble_comment(2, &body, 256, 4096);
        assert_eq!(failed, None);
        assert_eq!(decoded, c);

        let (short, _) = assemble_comment(2, &body, 256, 8);
        assert_eq!(short.body.as_deref(), Some("Cyclotr"));
    }

    fn sample_var() -> IndependentVariable {
        IndependentVariable {
            low: Some(290.0),
            high: Some(300.0),
            mean: Some(295.0),
            std_dev: Some(1.5),
            skewness: Some(0.0),
            name: Some("Sample temp".to_owned()),
            description: None,
            units: Some("K".to_owned()),
            historical_data: None,
            time_data: None,
        }
    }

    #[test]
    fn scalar_variant_never_has_history() {
        let body = ind_var_body(&sample_var()).unwrap();
        let (var, failed) = assemble_independent_variable(&body, None, 256).unwrap();
        assert_eq!(failed, None);
        assert_eq!(var, sample_var());
    }

    #[test]
    fn array_variant_history() {
        let body = ind_var_body(&sample_var()).unwrap();
        let hist = HistoricalData::Real(vec![294.5, 295.5]);
        let array = array_body(&hist, Some(&[10u32, 20][..])).unwrap();

        let (var, failed) = assemble_independent_variable(&body, Some(&array), 256).unwrap();
        assert_eq!(failed, None);
        assert_eq!(var.historical_data, Some(hist));
        assert_eq!(var.time_data, Some(vec![10, 20]));

        let text = HistoricalData::Text(vec![Some("on".to_owned()), None]);
        let array = array_body(&text, None).unwrap();
        let (var, _) = assemble_independent_variable(&body, Some(&array), 256).unwrap();
        assert_eq!(var.historical_data, Some(text));
        assert_eq!(var.time_data, None);
    }

    fn raw_array(num: u32, elem_size: u32, data_type: u32, payload: &[u8]) -> Vec<u8> {
        let mut a = Vec::new();
        for v in &[num, elem_size, data_type, 0, payload.len() as u32] {
            a.extend_from_slice(&v.to_le_bytes());
        }
        a.extend_from_slice(payload);
        a
    }

    #[test]
    fn history_prerequisites() {
        let body = ind_var_body(&sample_var()).unwrap();

        // Unknown data type: history and times are absent together.
        let array = raw_array(1, 4, 7, &[0; 4]);
        let (var, _) = assemble_independent_variable(&body, Some(&array), 256).unwrap();
        assert_eq!(var.historical_data, None);
        assert_eq!(var.time_data, None);

        // Zero element size likewise.
        let array = raw_array(1, 0, 1, &[]);
        let (var, _) = assemble_independent_variable(&body, Some(&array), 256).unwrap();
        assert_eq!(var.historical_data, None);

        // Truncated array header.
        let (var, failed) = assemble_independent_variable(&body, Some(&[1, 0, 0]), 256).unwrap();
        assert_eq!(var.historical_data, None);
        assert_eq!(failed, Some("history length"));
        assert_eq!(var.mean, Some(295.0));
    }

    #[test]
    fn history_format_errors() {
        let body = ind_var_body(&sample_var()).unwrap();

        let array = raw_array(1, 3, 1, &[0; 3]);
        assert!(matches!(
            assemble_independent_variable(&body, Some(&array), 256),
            Err(MudError::UnsupportedWidth { size: 3, kind: ElementKind::Integer })
        ));

        let array = raw_array(2, 8, 2, &[0; 8]);
        assert!(matches!(
            assemble_independent_variable(&body, Some(&array), 256),
            Err(MudError::LengthMismatch { expected: 16, actual: 8 })
        ));
    }

    #[test]
    fn extended_precision_history() {
        let body = ind_var_body(&sample_var()).unwrap();
        let payload = crate::numeric::f64_to_f80(12.5);
        let array = raw_array(1, 10, 2, &payload);
        let (var, _) = assemble_independent_variable(&body, Some(&array), 256).unwrap();
        assert_eq!(var.historical_data, Some(HistoricalData::Real(vec![12.5])));
    }
}
