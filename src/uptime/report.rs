//! Report accumulator and HTML rendering.

use crate::client::format_value;

const REPORT_TEMPLATE: &str = include_str!("templates/report.html");

/// One endpoint row, in evaluation order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub name: String,
    pub success: Option<f64>,
    pub failure: Option<f64>,
    /// Pre-formatted percentage, e.g. `98%`.
    pub uptime: String,
}

/// Rows collected during one run, handed to the renderer at the end.
#[derive(Debug, Clone, Default)]
pub struct Report {
    show_count: bool,
    rows: Vec<ReportRow>,
}

impl Report {
    pub fn new(show_count: bool) -> Self {
        Self {
            show_count,
            rows: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    /// Append a row. Counts are kept only when the report shows them.
    pub fn push(&mut self, name: &str, success: f64, failure: f64, uptime_percent: f64) {
        let (success, failure) = if self.show_count {
            (Some(success), Some(failure))
        } else {
            (None, None)
        };

        self.rows.push(ReportRow {
            name: name.to_string(),
            success,
            failure,
            uptime: format!("{}%", format_value(uptime_percent)),
        });
    }

    /// Render the full HTML document.
    pub fn render_html(&self, title: &str, date: &str) -> String {
        let mut header = vec!["<th>Endpoint</th>"];
        if self.show_count {
            header.push("<th>2XX</th>");
            header.push("<th>5XX</th>");
        }
        header.push("<th>Uptime</th>");

        let rows: String = self
            .rows
            .iter()
            .map(|row| {
                let mut cells = vec![cell(&row.name)];
                if self.show_count {
                    cells.push(cell(&row.success.map(format_value).unwrap_or_default()));
                    cells.push(cell(&row.failure.map(format_value).unwrap_or_default()));
                }
                cells.push(cell(&row.uptime));
                format!("<tr>\n{}\n</tr>", cells.join("\n"))
            })
            .collect::<Vec<_>>()
            .join("\n");

        REPORT_TEMPLATE
            .replace("{{title}}", &escape_html(&format!("{} for {}", title, date)))
            .replace("{{date}}", &escape_html(date))
            .replace("{{header}}", &header.join("\n"))
            .replace("{{rows}}", &rows)
    }
}

fn cell(text: &str) -> String {
    format!("<td>{}</td>", escape_html(text))
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_keep_order() {
        let mut report = Report::new(false);
        report.push("b", 1.0, 0.0, 100.0);
        report.push("a", 1.0, 1.0, 50.0);

        let names: Vec<&str> = report.rows().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(report.rows()[1].uptime, "50%");
        assert_eq!(report.rows()[1].success, None);
    }

    #[test]
    fn test_render_with_counts() {
        let mut report = Report::new(true);
        report.push("api", 980.0, 20.0, 98.0);
        report.push("idle", 0.0, 0.0, 100.0);

        let html = report.render_html("Uptime", "2024-01-01");
        assert!(html.contains("<title>Uptime for 2024-01-01</title>"));
        assert!(html.contains("Uptime Percentile for 2024-01-01:"));
        assert!(html.contains("<th>2XX</th>"));
        assert!(html.contains("<td>api</td>\n<td>980</td>\n<td>20</td>\n<td>98%</td>"));
        assert!(html.contains("<td>idle</td>\n<td>0</td>\n<td>0</td>\n<td>100%</td>"));
        assert!(html.find("api").unwrap() < html.find("idle").unwrap());
    }

    #[test]
    fn test_render_without_counts() {
        let mut report = Report::new(false);
        report.push("api", 980.0, 20.0, 98.0);

        let html = report.render_html("Uptime", "2024-01-01");
        assert!(!html.contains("2XX"));
        assert!(html.contains("<tr>\n<td>api</td>\n<td>98%</td>\n</tr>"));
    }

    #[test]
    fn test_names_escaped() {
        let mut report = Report::new(false);
        report.push("<script>", 1.0, 0.0, 100.0);

        let html = report.render_html("Uptime", "2024-01-01");
        assert!(html.contains("<td>&lt;script&gt;</td>"));
    }
}
