use pretty_assertions::assert_eq;
use proptest::prelude::*;
use sable::error::ErrorKind;
use sable::lexer::{Lexer, Literal, Token, TokenType};

fn lex(source: &str) -> Vec<Token> {
    Lexer::new(source.to_string())
        .scan_tokens()
        .expect("source should lex")
}

fn types(source: &str) -> Vec<TokenType> {
    lex(source).iter().map(|token| token.token_type).collect()
}

#[test]
fn arithmetic_token_listing() {
    let listing: Vec<String> = lex("3.5 * (5.75 + 4)")
        .iter()
        .map(|token| token.to_string())
        .collect();

    assert_eq!(
        listing,
        vec![
            "NUMBER 3.5",
            "MUL",
            "LPAREN",
            "NUMBER 5.75",
            "PLUS",
            "NUMBER 4",
            "RPAREN",
            "END"
        ]
    );
}

#[test]
fn empty_source_is_just_end() {
    assert_eq!(types(""), vec![TokenType::Eof]);
    assert_eq!(types("  \n\t "), vec![TokenType::Eof]);
}

#[test]
fn two_character_operators_win() {
    assert_eq!(
        types("== != >= <= && || = ! > <"),
        vec![
            TokenType::EqualEqual,
            TokenType::BangEqual,
            TokenType::GreaterEqual,
            TokenType::LessEqual,
            TokenType::AndAnd,
            TokenType::OrOr,
            TokenType::Equal,
            TokenType::Bang,
            TokenType::Greater,
            TokenType::Less,
            TokenType::Eof,
        ]
    );
    // No whitespace needed between operators and operands.
    assert_eq!(
        types("a==b"),
        vec![
            TokenType::Identifier,
            TokenType::EqualEqual,
            TokenType::Identifier,
            TokenType::Eof,
        ]
    );
}

#[test]
fn keywords_and_literals() {
    assert_eq!(
        types("let const if else loop next stop function return print take"),
        vec![
            TokenType::Let,
            TokenType::Const,
            TokenType::If,
            TokenType::Else,
            TokenType::Loop,
            TokenType::Next,
            TokenType::Stop,
            TokenType::Function,
            TokenType::Return,
            TokenType::Print,
            TokenType::Take,
            TokenType::Eof,
        ]
    );

    let tokens = lex("true false null \"hi there\" letter _x9");
    assert_eq!(tokens[0].literal, Literal::Boolean(true));
    assert_eq!(tokens[1].literal, Literal::Boolean(false));
    assert_eq!(tokens[2].token_type, TokenType::Null);
    assert_eq!(tokens[3].token_type, TokenType::String);
    assert_eq!(tokens[3].literal, Literal::Text("hi there".to_string()));
    assert_eq!(tokens[3].lexeme, "\"hi there\"");
    // A keyword prefix does not make a keyword.
    assert_eq!(tokens[4].token_type, TokenType::Identifier);
    assert_eq!(tokens[5].lexeme, "_x9");
}

#[test]
fn positions_are_one_based() {
    let tokens = lex("let x = 1;\n  print(x)");

    let print = &tokens[5];
    assert_eq!(print.token_type, TokenType::Print);
    assert_eq!((print.line(), print.column()), (2, 3));

    let x = &tokens[7];
    assert_eq!(x.lexeme, "x");
    assert_eq!((x.line(), x.column()), (2, 9));
    assert_eq!(x.span.start, 19);
    assert_eq!(x.span.end, 20);
}

#[test]
fn comments_are_skipped() {
    assert_eq!(
        types("1 // one\n// whole line\n2"),
        vec![TokenType::Number, TokenType::Number, TokenType::Eof]
    );
    // A single slash is still division.
    assert_eq!(
        types("4 / 2"),
        vec![
            TokenType::Number,
            TokenType::Slash,
            TokenType::Number,
            TokenType::Eof
        ]
    );
}

#[test]
fn dot_without_digits_is_not_part_of_a_number() {
    assert_eq!(
        types("1."),
        vec![TokenType::Number, TokenType::Dot, TokenType::Eof]
    );
    assert_eq!(
        types("p.x"),
        vec![
            TokenType::Identifier,
            TokenType::Dot,
            TokenType::Identifier,
            TokenType::Eof
        ]
    );
}

#[test]
fn unterminated_string_is_a_lex_error() {
    let error = Lexer::new("let s = \"open".to_string())
        .scan_tokens()
        .unwrap_err();

    assert_eq!(error.kind, ErrorKind::Lex);
    assert_eq!(error.message, "Unterminated string");
    assert_eq!((error.line(), error.column()), (1, 9));
}

#[test]
fn unknown_characters_report_their_position() {
    let error = Lexer::new("x = 1\ny = @home".to_string())
        .scan_tokens()
        .unwrap_err();

    assert_eq!(error.kind, ErrorKind::Lex);
    assert!(error.message.contains("'@home'"), "{}", error.message);
    assert_eq!((error.line(), error.column()), (2, 5));
}

proptest! {
    #[test]
    fn numerals_keep_their_value(whole in 0u32..1_000_000, frac in 0u32..1000) {
        let text = format!("{}.{}", whole, frac);
        let tokens = Lexer::new(text.clone()).scan_tokens().unwrap();

        prop_assert_eq!(tokens.len(), 2);
        prop_assert_eq!(tokens[0].token_type, TokenType::Number);
        prop_assert_eq!(&tokens[0].lexeme, &text);
        prop_assert_eq!(&tokens[0].literal, &Literal::Number(text.parse::<f64>().unwrap()));
    }

    #[test]
    fn identifiers_lex_whole(name in "[a-z_][a-z0-9_]{0,12}") {
        let tokens = Lexer::new(name.clone()).scan_tokens().unwrap();
        prop_assert_eq!(&tokens[0].lexeme, &name);
        prop_assert_eq!(tokens.len(), 2);
    }
}
