//! Reporting the outcome of client commands.

use std::{fmt, io};
use std::str::FromStr;
use serde::Serialize;
use super::error::Error;


//------------ ReportFormat --------------------------------------------------

/// The format to report responses in.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            _ => Err(format!("unsupported format: {s}")),
        }
    }
}


//------------ Reportable ----------------------------------------------------

/// A response that can be reported in every format.
pub trait Reportable {
    fn report(
        &self, format: ReportFormat, target: &mut dyn io::Write
    ) -> io::Result<()>;
}

impl<T: Serialize + fmt::Display> Reportable for T {
    fn report(
        &self, format: ReportFormat, target: &mut dyn io::Write
    ) -> io::Result<()> {
        match format {
            ReportFormat::Text => {
                let text = self.to_string();
                if text.ends_with('\n') {
                    write!(target, "{text}")
                }
                else {
                    writeln!(target, "{text}")
                }
            }
            ReportFormat::Json => {
                serde_json::to_writer_pretty(&mut *target, self)?;
                writeln!(target)
            }
        }
    }
}


//------------ Report --------------------------------------------------------

/// The outcome of a command.
pub struct Report {
    content: Result<Box<dyn Reportable>, Error>,
}

impl Report {
    pub fn new<T: Reportable + 'static>(content: T) -> Self {
        Report { content: Ok(Box::new(content)) }
    }

    pub fn from_error(err: impl Into<Error>) -> Self {
        Report { content: Err(err.into()) }
    }

    pub fn is_ok(&self) -> bool {
        self.content.is_ok()
    }

    /// Writes the report and returns the process exit code.
    ///
    /// Responses go to `out`, errors to `err`.
    pub fn write(
        &self,
        format: ReportFormat,
        out: &mut dyn io::Write,
        err: &mut dyn io::Write,
    ) -> i32 {
        match &self.content {
            Ok(content) => match content.report(format, out) {
                Ok(()) => 0,
                Err(io_err) => {
                    let _ = writeln!(err, "Error: cannot write report: {io_err}");
                    1
                }
            },
            Err(error) => {
                let _ = writeln!(err, "Error: {error}");
                1
            }
        }
    }

    /// Writes the report to stdout or stderr and returns the exit code.
    pub fn report(&self, format: ReportFormat) -> i32 {
        self.write(format, &mut io::stdout(), &mut io::stderr())
    }
}

impl<T, E> From<Result<T, E>> for Report
where
    T: Reportable + 'static,
    E: Into<Error>,
{
    fn from(res: Result<T, E>) -> Self {
        match res {
            Ok(content) => Report::new(content),
            Err(err) => Report::from_error(err),
        }
    }
}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::status::Success;
    use crate::api::user::GroupData;

    fn write(report: Report, format: ReportFormat) -> (i32, String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = report.write(format, &mut out, &mut err);
        (
            code,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn report_formats() {
        assert_eq!("json".parse(), Ok(ReportFormat::Json));
        assert!("yaml".parse::<ReportFormat>().is_err());

        let (code, out, _) = write(Report::new(Success), ReportFormat::Text);
        assert_eq!((code, out.as_str()), (0, "Ok\n"));

        let (code, out, _) = write(Report::new(Success), ReportFormat::Json);
        assert_eq!(code, 0);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&out).unwrap(),
            serde_json::json!({"status": "Ok"})
        );

        let group = GroupData::new("Auditors", Some("Read only"));
        let (_, out, _) = write(Report::new(group), ReportFormat::Text);
        assert_eq!(out, "Group ID: Auditors\nDescription: Read only\n");
    }

    #[test]
    fn report_error() {
        let res: Result<Success, Error> = Err(Error::input("no such file"));
        let report = Report::from(res);
        assert!(!report.is_ok());
        let (code, out, err) = write(report, ReportFormat::Json);
        assert_eq!(code, 1);
        assert!(out.is_empty());
        assert_eq!(err, "Error: no such file\n");
    }
}
