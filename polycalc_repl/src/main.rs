use clap::{Parser, ValueEnum};
use codesnake::{Block, CodeWidth, Label, LineIndex};
use polycalc::{
    fp,
    lexer::{LexError, Span, Token, TokenKind},
    CalcError, Calculator, Notation,
};
use tracing_subscriber::EnvFilter;
use yansi::Paint;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum NotationArg {
    Prefix,
    Infix,
    Postfix,
}

impl From<NotationArg> for Notation {
    fn from(arg: NotationArg) -> Self {
        match arg {
            NotationArg::Prefix => Notation::Prefix,
            NotationArg::Infix => Notation::Infix,
            NotationArg::Postfix => Notation::Postfix,
        }
    }
}

/// Interactive double precision calculator.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Notation input lines are read in
    #[arg(long, value_enum, default_value_t = NotationArg::Infix)]
    notation: NotationArg,
}

fn install_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn make_block<'a>(
    idx: &'a LineIndex,
    labels: impl IntoIterator<Item = (Span, Result<Token, LexError>)>,
) -> Option<Block<&'a str, String>> {
    Block::new(
        idx,
        labels.into_iter().map(|(range, token)| {
            let text = match &token {
                Ok(token) => token.kind.to_string().green().to_string(),
                Err(err) => err.to_string().red().to_string(),
            };
            Label::new(range).with_text(text).with_style(move |s: String| match &token {
                Ok(Token {
                    kind: TokenKind::Symbol | TokenKind::SymbolWithArgs,
                    ..
                }) => s.blue().to_string(),
                Ok(Token {
                    kind: TokenKind::Operator | TokenKind::Modifier,
                    ..
                }) => s.yellow().to_string(),
                Ok(Token {
                    kind: TokenKind::String,
                    ..
                }) => s.cyan().to_string(),
                Ok(_) => s,
                Err(_) => s.red().to_string(),
            })
        }),
    )
}

fn print_block(block: Option<Block<&str, String>>, name: &str) {
    if let Some(block) = block.map(|blk| blk.map_code(|c| CodeWidth::new(c, c.len()))) {
        println!("{}[{name}]", block.prologue());
        print!("{block}");
        println!("{}", block.epilogue());
    }
}

/// `span` if codesnake can label it: non-empty, inside `source`, on char boundaries.
fn label_span(source: &str, span: Span) -> Option<Span> {
    let fits = span.start < span.end
        && span.end <= source.len()
        && source.is_char_boundary(span.start)
        && source.is_char_boundary(span.end);
    fits.then_some(span)
}

/// Labels every token of `source`, stopping at the first lexer error.
fn show_tokens(calculator: &Calculator<f64>, source: &str) {
    let idx = LineIndex::new(source);
    let mut tokens = calculator.compilers.tokenize(source);
    let mut labels = vec![];
    loop {
        match tokens.next_token() {
            Ok(Some(token)) => labels.push((token.span.clone(), Ok(token))),
            Ok(None) => break,
            Err(err) => {
                match err.span().and_then(|span| label_span(source, span)) {
                    Some(span) => labels.push((span, Err(err))),
                    None => println!("{} {err}", "error:".red().bold()),
                }
                break;
            }
        }
    }
    print_block(make_block(&idx, labels), "tokens");
}

fn show_error(source: &str, notation: Notation, err: &CalcError) {
    match err.span().and_then(|span| label_span(source, span)) {
        Some(span) => {
            let idx = LineIndex::new(source);
            let label = Label::new(span)
                .with_text(err.to_string().red().to_string())
                .with_style(|s: String| s.red().to_string());
            print_block(Block::new(&idx, [label]), &notation.to_string());
        }
        None => println!("{} {err}", "error:".red().bold()),
    }
}

fn show_values(values: &[f64]) {
    let rendered: Vec<String> = values.iter().map(|v| v.to_string().bright_white().to_string()).collect();
    println!("{} {}", "=>".dim(), rendered.join(" "));
}

fn main() -> anyhow::Result<()> {
    install_tracing();
    let args = Args::parse();

    let calculator = fp::calculator()?;
    let mut notation = Notation::from(args.notation);
    let mut last = Vec::new();
    let mut readline = rustyline::DefaultEditor::new()?;

    while let Ok(input) = readline.readline(&format!("{notation}> ")) {
        let line = input.trim();
        if line.is_empty() {
            continue;
        }
        let _ = readline.add_history_entry(line);

        if let Some(command) = line.strip_prefix(':') {
            let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
            match name {
                "notation" => match rest.trim().parse::<Notation>() {
                    Ok(next) => notation = next,
                    Err(err) => println!("{} {err}", "error:".red().bold()),
                },
                "stack" => show_values(&last),
                "tokens" => show_tokens(&calculator, rest),
                "quit" | "q" => break,
                _ => println!("{} unknown command ':{name}'", "error:".red().bold()),
            }
            continue;
        }

        match calculator.compile_and_execute(notation, &input) {
            Ok(values) => {
                show_values(&values);
                last = values;
            }
            Err(err) => show_error(&input, notation, &err),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use assert2::check;
    use polycalc::{fp, Notation};

    use super::label_span;

    #[test]
    fn labels_stay_on_char_boundaries() {
        let source = "1 + é";
        let err = fp::calculator()
            .map(|calculator| calculator.compile_and_execute(Notation::Infix, source));
        let span = match err {
            Ok(Err(err)) => err.span(),
            _ => None,
        };
        check!(span == Some(4..6));
        check!(span.and_then(|span| label_span(source, span)) == Some(4..6));

        check!(label_span(source, 4..5) == None);
        check!(label_span(source, 5..6) == None);
        check!(label_span(source, 6..7) == None);
        check!(label_span(source, 2..2) == None);
    }
}
