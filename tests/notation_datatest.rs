use datatest_stable::Utf8Path;
use polycalc::{fp, Notation};

#[derive(thiserror::Error, Debug)]
#[error("notation datatest failed at {0}")]
pub struct DatatestError(Box<Utf8Path>);

/// A `.calc` file: the notation, the expected stack (or error), then the source,
/// separated by `---` lines. Lines starting with `;` outside the source are comments.
struct CalcFile<'a> {
    comments: Vec<&'a str>,
    notation: &'a str,
    expected: Vec<&'a str>,
    source: String,
}

fn read_datatest(contents: &str) -> CalcFile<'_> {
    #[derive(PartialEq, Eq)]
    enum Section {
        Notation,
        Expected,
        Source,
    }

    let mut file = CalcFile {
        comments: vec![],
        notation: "",
        expected: vec![],
        source: String::new(),
    };
    let mut section = Section::Notation;

    for line in contents.lines() {
        if section != Section::Source && line.trim_start().starts_with(';') {
            file.comments.push(line);
            continue;
        }
        match section {
            Section::Notation if line.trim_end() == "---" => section = Section::Expected,
            Section::Notation if !line.trim().is_empty() => file.notation = line.trim(),
            Section::Notation => {}
            Section::Expected if line.trim_end() == "---" => section = Section::Source,
            Section::Expected => file.expected.push(line.trim()),
            Section::Source => {
                if !file.source.is_empty() {
                    file.source.push('\n');
                }
                file.source.push_str(line);
            }
        }
    }
    file
}

// comments are gathered at the top when rewriting
fn stitch_to_datatest(file: &CalcFile<'_>, results: &[String]) -> String {
    let mut lines: Vec<&str> = file.comments.clone();
    lines.push(file.notation);
    lines.push("---");
    lines.extend(results.iter().map(String::as_str));
    lines.push("---");
    lines.push(&file.source);
    let mut stitched = lines.join("\n");
    stitched.push('\n');
    stitched
}

fn notation_test(path: &Utf8Path, contents: String) -> datatest_stable::Result<()> {
    let file = read_datatest(&contents);
    let notation: Notation = file.notation.parse()?;
    let calculator = fp::calculator()?;

    let results: Vec<String> = match calculator.compile_and_execute(notation, &file.source) {
        Ok(values) => values.iter().map(|value| value.to_string()).collect(),
        Err(err) => vec![format!("error: {err}")],
    };

    if std::env::var("DATATEST_EXPECT").is_ok() {
        std::fs::write(path, stitch_to_datatest(&file, &results))?;
        return Ok(());
    }

    if results.iter().map(String::as_str).ne(file.expected.iter().copied()) {
        println!(
            "error in {path}: mismatched result\n\nGot:\n{}\n\nExpected:\n{}",
            results.join("\n"),
            file.expected.join("\n")
        );
        Err(DatatestError(Box::from(path)))?
    }
    Ok(())
}

datatest_stable::harness! {
    notation_test, "test_data", r"^.*\.calc",
}
