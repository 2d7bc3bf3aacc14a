use std::fmt::Write;

use crate::metrics::ClassMetrics;
use crate::report::{highlight, PredictionReport};
use crate::session::Session;
use crate::table::{SensorTable, PREDICTED};

const STYLE: &str = r#"
body{font-family:sans-serif;margin:0;display:flex}
aside{width:260px;min-height:100vh;background:#f0f2f6;padding:1rem;box-sizing:border-box}
main{flex:1;padding:1rem 2rem;max-width:960px}
table{border-collapse:collapse;font-size:.85rem;margin:.5rem 0}
th,td{border:1px solid #ddd;padding:.25rem .5rem;text-align:right}
.info{background:#e7f1fb;padding:.6rem;border-radius:4px;font-size:.85rem}
.warn{background:#fff3cd;border:1px solid #ffe69c;padding:.6rem;border-radius:4px}
.error{background:#f8d7da;border:1px solid #f1aeb5;padding:.6rem;border-radius:4px}
.bar{display:flex;align-items:center;gap:.5rem;margin:.2rem 0}
.bar span.fill{display:inline-block;height:1.2rem;background:#4e79a7}
.scroll{max-height:420px;overflow:auto}
"#;

pub const INFO_TEXT: &str =
    "This model predicts engine health using sensor readings. 1 = Healthy, 0 = Unhealthy";

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, sidebar: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{}</title><style>{}</style></head>\
         <body><aside>{}</aside><main>{}</main></body></html>",
        escape(title),
        STYLE,
        sidebar,
        body
    )
}

fn sidebar() -> String {
    format!(
        "<h2>&#128193; Upload Data</h2>\
         <form method=\"post\" action=\"/upload\" enctype=\"multipart/form-data\">\
         <label>Upload engine_data.csv</label><br>\
         <input type=\"file\" name=\"file\" accept=\".csv\" required><br><br>\
         <button type=\"submit\">Upload</button></form><br>\
         <div class=\"info\">{}</div>",
        escape(INFO_TEXT)
    )
}

fn header_row(out: &mut String, headers: impl IntoIterator<Item = impl AsRef<str>>) {
    out.push_str("<tr>");
    for h in headers {
        let _ = write!(out, "<th>{}</th>", escape(h.as_ref()));
    }
    out.push_str("</tr>");
}

fn preview(table: &SensorTable, n: usize) -> String {
    let mut out = String::from("<table>");
    header_row(&mut out, table.headers());
    for row in table.head(n) {
        out.push_str("<tr>");
        for cell in row {
            let _ = write!(out, "<td>{}</td>", escape(cell));
        }
        out.push_str("</tr>");
    }
    out.push_str("</table>");
    out
}

fn results_table(table: &SensorTable, report: &PredictionReport) -> String {
    let mut out = String::from("<div class=\"scroll\"><table>");
    header_row(
        &mut out,
        table.headers().iter().map(String::as_str).chain([PREDICTED]),
    );
    for (row, label) in table.rows().zip(&report.predictions) {
        out.push_str("<tr>");
        for cell in row {
            let _ = write!(out, "<td>{}</td>", escape(cell));
        }
        match highlight(*label) {
            Some(bg) => {
                let _ = write!(out, "<td style=\"background-color: {}\">{}</td>", bg, label);
            }
            None => {
                let _ = write!(out, "<td>{}</td>", label);
            }
        }
        out.push_str("</tr>");
    }
    out.push_str("</table></div>");
    out
}

fn distribution_chart(report: &PredictionReport) -> String {
    let max = report.counts.values().copied().max().unwrap_or(0).max(1);
    let mut out = String::new();
    for (label, count) in &report.counts {
        let width = 300 * count / max;
        let _ = write!(
            out,
            "<div class=\"bar\"><b>{}</b><span class=\"fill\" style=\"width:{}px\"></span>{}</div>",
            label, width, count
        );
    }
    out
}

fn metrics_row(out: &mut String, c: &ClassMetrics) {
    let _ = write!(
        out,
        "<tr><th>{}</th><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td></tr>",
        escape(&c.label),
        c.precision,
        c.recall,
        c.f1_score,
        c.support as f64
    );
}

fn evaluation(report: &PredictionReport) -> String {
    let Some(eval) = &report.evaluation else {
        return String::new();
    };
    let r = &eval.report;
    let mut out = format!(
        "<h3>&#9989; Accuracy: {:.2}%</h3><h3>&#128202; Classification Report (Detailed Table)</h3><table>",
        eval.accuracy * 100.0
    );
    header_row(&mut out, ["", "precision", "recall", "f1-score", "support"]);
    for c in &r.classes {
        metrics_row(&mut out, c);
    }
    // the accuracy row repeats the score in every column, support included
    let _ = write!(
        out,
        "<tr><th>accuracy</th><td>{0:.2}</td><td>{0:.2}</td><td>{0:.2}</td><td>{0:.2}</td></tr>",
        r.accuracy
    );
    metrics_row(&mut out, &r.macro_avg);
    metrics_row(&mut out, &r.weighted_avg);
    out.push_str("</table>");
    out
}

/// Main page for the current session.
pub fn page(session: &Session, preview_rows: usize) -> String {
    let mut body = String::from("<h1>&#128663; Vehicle Health Prediction App</h1>");

    if let Some(err) = session.error() {
        let _ = write!(body, "<div class=\"warn\">&#9888;&#65039; {}</div>", escape(err));
    }

    if let Some(table) = session.table() {
        let _ = write!(
            body,
            "<h3>&#128196; Uploaded Data (Top {} rows)</h3><p>{} &middot; {} rows</p>{}\
             <form method=\"post\" action=\"/predict\"><button type=\"submit\">&#128640; Predict</button></form>",
            preview_rows,
            escape(session.file_name().unwrap_or_default()),
            table.len(),
            preview(table, preview_rows)
        );

        if let Some(report) = session.report() {
            let _ = write!(
                body,
                "<h3>&#128269; Prediction Results</h3>{}\
                 <h3>&#128202; Prediction Distribution</h3>{}\
                 <p><a href=\"/download\" download=\"predictions.csv\">&#11015;&#65039; Download Results</a></p>{}",
                results_table(table, report),
                distribution_chart(report),
                evaluation(report)
            );
        }
    }

    layout("Vehicle Health Predictor", &sidebar(), &body)
}

/// Static page served for every route when the model could not be loaded.
pub fn unavailable(message: &str) -> String {
    let body = format!(
        "<h1>&#128663; Vehicle Health Prediction App</h1><div class=\"error\">&#10060; {}</div>",
        escape(message)
    );
    layout("Vehicle Health Predictor", "", &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("<a href='x'>&</a>"), "&lt;a href=&#39;x&#39;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn unknown_label_cell_is_unstyled() {
        let t = SensorTable::from_csv_bytes(b"a\n1\n2\n3\n").unwrap();
        let r = PredictionReport::build(&t, vec![1, 0, 7]).unwrap();
        let html = results_table(&t, &r);
        assert!(html.contains("<td style=\"background-color: #d4edda\">1</td>"));
        assert!(html.contains("<td style=\"background-color: #f8d7da\">0</td>"));
        assert!(html.contains("<td>7</td>"));
    }

    #[test]
    fn empty_session_shows_only_upload() {
        let html = page(&Session::default(), 5);
        assert!(html.contains("Vehicle Health Prediction App"));
        assert!(html.contains(INFO_TEXT));
        assert!(!html.contains("Predict</button>"));
    }

    #[test]
    fn accuracy_row_fills_every_column() {
        let t = SensorTable::from_csv_bytes(b"a,Engine Condition\n1,1\n2,0\n3,0\n4,0\n").unwrap();
        let r = PredictionReport::build(&t, vec![1, 0, 1, 0]).unwrap();
        let html = evaluation(&r);
        assert!(html.contains(
            "<tr><th>accuracy</th><td>0.75</td><td>0.75</td><td>0.75</td><td>0.75</td></tr>"
        ));
        // per-class and average rows keep their counts
        assert!(html.contains("<tr><th>weighted avg</th>"));
        assert!(html.contains("<td>4.00</td></tr>"));
    }
}
