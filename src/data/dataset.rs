//! Training frame: per-game feature rows with margin and home-win targets.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

use crate::error::{HooplineError, Result};
use crate::ml::Objective;

/// Columns that describe the game rather than feed the model.
pub const INFO_COLUMNS: &[&str] = &[
    "date",
    "away_team_name",
    "home_team_name",
    "away_team_pts",
    "home_team_pts",
];

/// Derived target columns never used as features.
pub const TARGET_COLUMNS: &[&str] = &["spread_home", "home_win", "MOV", "total_pts"];

/// Split one CSV record. Fields may be wrapped in `"` with `""` for a literal
/// quote. Returns `None` while a quoted field is still open.
fn split_record(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match (quoted, c) {
            (true, '"') if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            (true, '"') => quoted = false,
            (false, '"') if field.is_empty() => quoted = true,
            (false, ',') => fields.push(std::mem::take(&mut field)),
            (_, c) => field.push(c),
        }
    }
    if quoted {
        return None;
    }
    fields.push(field);
    Some(fields)
}

/// Logical CSV records over physical lines; a quoted field may span lines.
struct Records<I> {
    lines: I,
    line_no: usize,
}

impl<I: Iterator<Item = std::io::Result<String>>> Records<I> {
    /// Next record with the 1-based line number it starts on.
    fn next_record(&mut self) -> Result<Option<(usize, Vec<String>)>> {
        let Some(first) = self.lines.next() else {
            return Ok(None);
        };
        self.line_no += 1;
        let start = self.line_no;
        let mut buf = first?;
        loop {
            if let Some(fields) = split_record(&buf) {
                return Ok(Some((start, fields)));
            }
            let Some(next) = self.lines.next() else {
                return Err(HooplineError::SchemaMismatch(format!(
                    "unterminated quoted field starting on line {start}"
                )));
            };
            self.line_no += 1;
            buf.push('\n');
            buf.push_str(&next?);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrainingFrame {
    pub feature_names: Vec<String>,
    pub features: Vec<Vec<f64>>,
    /// home points minus away points
    pub margin: Vec<f64>,
    /// 1.0 when the home team won
    pub home_win: Vec<f64>,
}

impl TrainingFrame {
    pub fn new(
        feature_names: Vec<String>,
        features: Vec<Vec<f64>>,
        margin: Vec<f64>,
    ) -> Result<Self> {
        if features.len() != margin.len() {
            return Err(HooplineError::Validation(format!(
                "{} feature rows but {} targets",
                features.len(),
                margin.len()
            )));
        }
        if let Some((idx, row)) = features
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != feature_names.len())
        {
            return Err(HooplineError::SchemaMismatch(format!(
                "row {idx} has {} values for {} feature names",
                row.len(),
                feature_names.len()
            )));
        }
        let home_win = margin.iter().map(|m| if *m > 0.0 { 1.0 } else { 0.0 }).collect();
        Ok(Self {
            feature_names,
            features,
            margin,
            home_win,
        })
    }

    /// Load a training CSV.
    /// Expected format: header row; `away_team_pts` and `home_team_pts` are required,
    /// other non-info columns are features.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => HooplineError::ArtifactNotFound(path.to_path_buf()),
            _ => HooplineError::Io(e),
        })?;
        let mut records = Records {
            lines: BufReader::new(file).lines(),
            line_no: 0,
        };

        let (_, header) = records
            .next_record()?
            .ok_or_else(|| HooplineError::Validation(format!("{} is empty", path.display())))?;
        let columns: Vec<String> = header.into_iter().map(|c| c.trim().to_string()).collect();

        let col = |name: &str| columns.iter().position(|c| c == name);
        let away_idx = col("away_team_pts").ok_or_else(|| {
            HooplineError::SchemaMismatch("training data lacks away_team_pts".to_string())
        })?;
        let home_idx = col("home_team_pts").ok_or_else(|| {
            HooplineError::SchemaMismatch("training data lacks home_team_pts".to_string())
        })?;

        let feature_idx: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                !INFO_COLUMNS.contains(&c.as_str()) && !TARGET_COLUMNS.contains(&c.as_str())
            })
            .map(|(i, _)| i)
            .collect();
        let feature_names = feature_idx.iter().map(|i| columns[*i].clone()).collect();

        let mut features = Vec::new();
        let mut margin = Vec::new();
        let mut coerced = 0usize;
        let mut skipped = 0usize;

        while let Some((line_no, parts)) = records.next_record()? {
            if parts.len() == 1 && parts[0].trim().is_empty() {
                continue;
            }
            if parts.len() != columns.len() {
                warn!("Skipping malformed line {line_no}: {} columns, expected {}", parts.len(), columns.len());
                skipped += 1;
                continue;
            }

            let pts = |idx: usize| parts[idx].trim().parse::<f64>().ok();
            let (Some(away), Some(home)) = (pts(away_idx), pts(home_idx)) else {
                warn!("Skipping line {line_no}: unparseable points");
                skipped += 1;
                continue;
            };

            let row: Vec<f64> = feature_idx
                .iter()
                .map(|idx| match parts[*idx].trim().parse::<f64>() {
                    Ok(v) if v.is_finite() => v,
                    _ => {
                        coerced += 1;
                        0.0
                    }
                })
                .collect();

            features.push(row);
            margin.push(home - away);
        }

        if coerced > 0 {
            warn!(coerced, "Non-numeric feature cells coerced to 0.0");
        }
        info!(
            rows = features.len(),
            skipped,
            features = feature_idx.len(),
            "Loaded training frame from {}",
            path.display()
        );

        Self::new(feature_names, features, margin)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn targets(&self, objective: Objective) -> &[f64] {
        match objective {
            Objective::GaussianNll => &self.margin,
            Objective::BinaryCrossEntropy => &self.home_win,
        }
    }

    pub fn select(&self, rows: &[usize]) -> Self {
        Self {
            feature_names: self.feature_names.clone(),
            features: rows.iter().map(|r| self.features[*r].clone()).collect(),
            margin: rows.iter().map(|r| self.margin[*r]).collect(),
            home_win: rows.iter().map(|r| self.home_win[*r]).collect(),
        }
    }

    /// Seeded shuffle split into (train, validation).
    pub fn split(&self, validation_fraction: f64, seed: u64) -> Result<(Self, Self)> {
        if !(0.0..1.0).contains(&validation_fraction) {
            return Err(HooplineError::Validation(format!(
                "validation_fraction {validation_fraction} must be in [0, 1)"
            )));
        }
        let mut idx: Vec<usize> = (0..self.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        idx.shuffle(&mut rng);

        let n_val = (self.len() as f64 * validation_fraction).ceil() as usize;
        let n_val = n_val.min(self.len().saturating_sub(1));
        let (val_idx, train_idx) = idx.split_at(n_val);
        Ok((self.select(train_idx), self.select(val_idx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_csv(name: &str, body: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("hoopline_{}_{}.csv", name, std::process::id()));
        let mut f = File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_features_and_targets() {
        let path = temp_csv(
            "frame",
            "date,away_team_name,home_team_name,away_team_pts,home_team_pts,adj_oe,pace,spread_home\n\
             2025-01-02,A,B,70,80,101.5,68.0,10\n\
             2025-01-03,C,D,75,71,n/a,70.5,-4\n\
             2025-01-04,E,F,bad,71,99.0,70.5,0\n",
        );
        let frame = TrainingFrame::from_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(frame.feature_names, vec!["adj_oe", "pace"]);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.margin, vec![10.0, -4.0]);
        assert_eq!(frame.home_win, vec![1.0, 0.0]);
        // non-numeric cell coerced
        assert_eq!(frame.features[1], vec![0.0, 70.5]);
    }

    #[test]
    fn quoted_fields_keep_commas_and_quotes() {
        assert_eq!(
            split_record(r#"1,"North Carolina, Chapel Hill","Saint Mary's ""Gaels""",x"#).unwrap(),
            vec!["1", "North Carolina, Chapel Hill", r#"Saint Mary's "Gaels""#, "x"]
        );
        assert_eq!(split_record("a,,\"\"").unwrap(), vec!["a", "", ""]);
        assert!(split_record("a,\"open").is_none());
    }

    #[test]
    fn loads_rows_with_quoted_team_names() {
        let path = temp_csv(
            "quoted",
            "date,away_team_name,home_team_name,away_team_pts,home_team_pts,adj_oe\n\
             2025-01-02,\"North Carolina, Chapel Hill\",Duke,70,80,101.5\n\
             2025-01-03,\"Line\nBreak\",\"Say \"\"Hi\"\"\",75,71,99.0\n\
             2025-01-04,A,B,60,62,98.0\n",
        );
        let frame = TrainingFrame::from_csv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(frame.feature_names, vec!["adj_oe"]);
        assert_eq!(frame.margin, vec![10.0, -4.0, 2.0]);
        assert_eq!(frame.features, vec![vec![101.5], vec![99.0], vec![98.0]]);
    }

    #[test]
    fn unterminated_quote_is_schema_mismatch() {
        let path = temp_csv(
            "unterminated",
            "date,away_team_name,home_team_name,away_team_pts,home_team_pts,adj_oe\n\
             2025-01-02,\"Open,Duke,70,80,101.5\n",
        );
        let err = TrainingFrame::from_csv(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, HooplineError::SchemaMismatch(_)));
    }

    #[test]
    fn missing_file_is_artifact_not_found() {
        let err = TrainingFrame::from_csv("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, HooplineError::ArtifactNotFound(_)));
    }

    #[test]
    fn split_is_seeded_and_disjoint() {
        let names = vec!["x".to_string()];
        let features: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let margin: Vec<f64> = (0..10).map(|i| i as f64 - 5.0).collect();
        let frame = TrainingFrame::new(names, features, margin).unwrap();

        let (tr1, va1) = frame.split(0.2, 42).unwrap();
        let (tr2, va2) = frame.split(0.2, 42).unwrap();
        assert_eq!(va1.len(), 2);
        assert_eq!(tr1.len(), 8);
        assert_eq!(va1.features, va2.features);
        assert_eq!(tr1.features, tr2.features);

        let mut all: Vec<f64> = tr1.features.iter().chain(va1.features.iter()).map(|r| r[0]).collect();
        all.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(all, (0..10).map(|i| i as f64).collect::<Vec<_>>());
    }
}
