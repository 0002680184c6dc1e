//! Parser - recursive descent over the lookahead lexer
//!
//! Each precedence level has its own function, from the loosest binding
//! (`parse_expression1`, `||`) to the tightest (`parse_expression8`,
//! primaries). Nesting depth of the source maps directly onto native stack
//! depth, so extremely deep expressions can exhaust the stack.

use crate::ast::{BinaryOp, Expression, FunctionDefinition, RelationalOp};
use crate::error::CompileError;
use crate::lexer::{Keyword, Lexer, LookaheadLexer, Operator, Punctuation, Token};
use crate::location::SourceLocation;
use crate::types::Type;

type Result<T> = std::result::Result<T, CompileError>;

/// Parse `code` as a single expression, consuming all input.
pub fn parse_expression(code: &str) -> Result<Expression> {
    parse_complete(Lexer::new(code), Parser::parse_top_level_expression)
}

/// Parse `code` as a single function definition, consuming all input.
pub fn parse_function_definition(code: &str) -> Result<FunctionDefinition> {
    parse_complete(Lexer::new(code), Parser::parse_function_definition)
}

/// Parse a sequence of function definitions, e.g. a prelude file.
pub fn parse_function_definitions(code: &str, file: &str) -> Result<Vec<FunctionDefinition>> {
    parse_complete(
        Lexer::with_file(code, file),
        Parser::parse_function_definitions,
    )
}

fn parse_complete<T>(lexer: Lexer, parse: impl FnOnce(&mut Parser) -> Result<T>) -> Result<T> {
    let mut parser = Parser::new(lexer);
    let result = parse(&mut parser)?;
    parser.expect_end()?;
    Ok(result)
}

const fn punctuation(p: Punctuation) -> Token {
    Token::Punctuation(p)
}

const fn operator(op: Operator) -> Token {
    Token::Operator(op)
}

const fn keyword(k: Keyword) -> Token {
    Token::Keyword(k)
}

/// Parser state
pub struct Parser {
    lexer: LookaheadLexer,
}

impl Parser {
    pub fn new(lexer: Lexer) -> Self {
        Self {
            lexer: LookaheadLexer::new(lexer),
        }
    }

    /// Does the lexer have unread tokens?
    pub fn has_more(&self) -> bool {
        self.lexer.has_more()
    }

    /// Parse function definitions until the input ends.
    pub fn parse_function_definitions(&mut self) -> Result<Vec<FunctionDefinition>> {
        let mut result = Vec::new();
        while self.lexer.has_more() {
            result.push(self.parse_function_definition()?);
        }
        Ok(result)
    }

    /// ```text
    /// functionDefinition ::= "fun" name "(" args ")" [ ":" type ] "=" expression
    /// ```
    pub fn parse_function_definition(&mut self) -> Result<FunctionDefinition> {
        self.lexer.expect(&keyword(Keyword::Fun))?;
        let (name, _) = self.parse_name()?;
        let args = self.parse_argument_definition_list()?;
        let return_type = if self.lexer.read_if(&punctuation(Punctuation::Colon))? {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.lexer.expect(&punctuation(Punctuation::Equal))?;
        let body = self.parse_top_level_expression()?;

        Ok(FunctionDefinition {
            name,
            args,
            return_type,
            body,
        })
    }

    /// ```text
    /// topLevel ::= var | val | '{' exps '}' | ident "=" topLevel | expression1
    /// ```
    pub fn parse_top_level_expression(&mut self) -> Result<Expression> {
        let token = self.lexer.peek()?.token.clone();
        match token {
            Token::Keyword(Keyword::Var | Keyword::Val) => self.parse_variable_definition(),
            Token::Punctuation(Punctuation::LeftBrace) => self.parse_expression_list(),
            Token::Identifier(_) => {
                let exp = self.parse_expression1()?;
                match exp {
                    Expression::Ref { name, .. }
                        if self.lexer.next_is(&punctuation(Punctuation::Equal))? =>
                    {
                        self.parse_assign_to(name)
                    }
                    exp => Ok(exp),
                }
            }
            _ => self.parse_expression1(),
        }
    }

    /// Parses left-associative chains `next (op next)*` for the operators in `ops`.
    fn parse_binary_level(
        &mut self,
        ops: &[(Operator, BinaryOp)],
        next: fn(&mut Self) -> Result<Expression>,
    ) -> Result<Expression> {
        let mut exp = next(self)?;

        'chain: while self.lexer.has_more() {
            let location = self.lexer.next_location()?;
            for &(token, op) in ops {
                if self.lexer.read_if(&operator(token))? {
                    let rhs = next(self)?;
                    exp = Expression::Binary {
                        op,
                        lhs: Box::new(exp),
                        rhs: Box::new(rhs),
                        location,
                    };
                    continue 'chain;
                }
            }
            break;
        }

        Ok(exp)
    }

    /// `expression1 ::= expression2 ("||" expression2)*`
    fn parse_expression1(&mut self) -> Result<Expression> {
        self.parse_binary_level(&[(Operator::Or, BinaryOp::Or)], Self::parse_expression2)
    }

    /// `expression2 ::= expression3 ("&&" expression3)*`
    fn parse_expression2(&mut self) -> Result<Expression> {
        self.parse_binary_level(&[(Operator::And, BinaryOp::And)], Self::parse_expression3)
    }

    /// `expression3 ::= expression4 (("==" | "!=") expression4)*`
    fn parse_expression3(&mut self) -> Result<Expression> {
        self.parse_binary_level(
            &[
                (
                    Operator::EqualEqual,
                    BinaryOp::Relational(RelationalOp::Equals),
                ),
                (
                    Operator::NotEqual,
                    BinaryOp::Relational(RelationalOp::NotEquals),
                ),
            ],
            Self::parse_expression4,
        )
    }

    /// `expression4 ::= expression5 (("<" | ">" | "<=" | ">=") expression5)*`
    fn parse_expression4(&mut self) -> Result<Expression> {
        self.parse_binary_level(
            &[
                (
                    Operator::LessThan,
                    BinaryOp::Relational(RelationalOp::LessThan),
                ),
                (
                    Operator::LessThanOrEqual,
                    BinaryOp::Relational(RelationalOp::LessThanOrEqual),
                ),
                (
                    Operator::GreaterThan,
                    BinaryOp::Relational(RelationalOp::GreaterThan),
                ),
                (
                    Operator::GreaterThanOrEqual,
                    BinaryOp::Relational(RelationalOp::GreaterThanOrEqual),
                ),
            ],
            Self::parse_expression5,
        )
    }

    /// `expression5 ::= expression6 (("+" | "-") expression6)*`
    fn parse_expression5(&mut self) -> Result<Expression> {
        self.parse_binary_level(
            &[
                (Operator::Plus, BinaryOp::Plus),
                (Operator::Minus, BinaryOp::Minus),
            ],
            Self::parse_expression6,
        )
    }

    /// `expression6 ::= expression7 (("*" | "/") expression7)*`
    fn parse_expression6(&mut self) -> Result<Expression> {
        self.parse_binary_level(
            &[
                (Operator::Multiply, BinaryOp::Multiply),
                (Operator::Divide, BinaryOp::Divide),
            ],
            Self::parse_expression7,
        )
    }

    /// `expression7 ::= expression8 [ "(" args ")" ]`
    fn parse_expression7(&mut self) -> Result<Expression> {
        let exp = self.parse_expression8()?;

        if self.lexer.next_is(&punctuation(Punctuation::LeftParen))? {
            let args = self.parse_argument_list()?;
            Ok(Expression::call(exp, args))
        } else {
            Ok(exp)
        }
    }

    /// `expression8 ::= identifier | literal | not | "(" topLevel ")" | if | unless | while`
    fn parse_expression8(&mut self) -> Result<Expression> {
        let info = self.lexer.peek()?.clone();
        match info.token {
            Token::Identifier(_) => {
                let (name, location) = self.parse_name()?;
                Ok(Expression::Ref { name, location })
            }
            Token::Literal(value) => {
                self.lexer.read()?;
                Ok(Expression::Lit {
                    value,
                    location: info.location,
                })
            }
            Token::Operator(Operator::Not) => self.parse_not(),
            Token::Punctuation(Punctuation::LeftParen) => {
                self.in_parens(Self::parse_top_level_expression)
            }
            Token::Keyword(Keyword::If) => self.parse_if(),
            Token::Keyword(Keyword::Unless) => self.parse_unless(),
            Token::Keyword(Keyword::While) => self.parse_while(),
            token => Err(CompileError::syntax(
                info.location,
                format!("unexpected token {}", token),
            )),
        }
    }

    fn parse_assign_to(&mut self, variable: String) -> Result<Expression> {
        let location = self.lexer.expect(&punctuation(Punctuation::Equal))?;
        let rhs = self.parse_top_level_expression()?;

        Ok(Expression::Assign {
            variable,
            expression: Box::new(rhs),
            location,
        })
    }

    fn parse_variable_definition(&mut self) -> Result<Expression> {
        let mutable = self.lexer.next_is(&keyword(Keyword::Var))?;
        let location = if mutable {
            self.lexer.expect(&keyword(Keyword::Var))?
        } else {
            self.lexer.expect(&keyword(Keyword::Val))?
        };

        let (variable, _) = self.parse_name()?;
        self.lexer.expect(&punctuation(Punctuation::Equal))?;
        let expression = self.parse_top_level_expression()?;

        Ok(Expression::Var {
            variable,
            expression: Box::new(expression),
            mutable,
            location,
        })
    }

    /// Condition, consequent and optional `else` alternative shared by `if` and `unless`.
    fn parse_conditional_parts(
        &mut self,
    ) -> Result<(Expression, Expression, Option<Box<Expression>>)> {
        let condition = self.in_parens(Self::parse_top_level_expression)?;
        let consequent = self.parse_top_level_expression()?;
        let alternative = if self.lexer.read_if(&keyword(Keyword::Else))? {
            Some(Box::new(self.parse_top_level_expression()?))
        } else {
            None
        };
        Ok((condition, consequent, alternative))
    }

    fn parse_if(&mut self) -> Result<Expression> {
        let location = self.lexer.expect(&keyword(Keyword::If))?;
        let (condition, consequent, alternative) = self.parse_conditional_parts()?;

        Ok(Expression::If {
            condition: Box::new(condition),
            consequent: Box::new(consequent),
            alternative,
            location,
        })
    }

    /// `unless (c) a else b` is `if (!c) a else b`.
    fn parse_unless(&mut self) -> Result<Expression> {
        let location = self.lexer.expect(&keyword(Keyword::Unless))?;
        let (condition, consequent, alternative) = self.parse_conditional_parts()?;

        Ok(Expression::If {
            condition: Box::new(Expression::Not {
                expression: Box::new(condition),
                location: location.clone(),
            }),
            consequent: Box::new(consequent),
            alternative,
            location,
        })
    }

    fn parse_while(&mut self) -> Result<Expression> {
        let location = self.lexer.expect(&keyword(Keyword::While))?;
        let condition = self.in_parens(Self::parse_top_level_expression)?;
        let body = self.parse_top_level_expression()?;

        Ok(Expression::While {
            condition: Box::new(condition),
            body: Box::new(body),
            location,
        })
    }

    fn parse_expression_list(&mut self) -> Result<Expression> {
        let location = self.lexer.next_location()?;
        let expressions = self.between(
            Punctuation::LeftBrace,
            Punctuation::RightBrace,
            |parser| {
                if parser
                    .lexer
                    .next_is(&punctuation(Punctuation::RightBrace))?
                {
                    Ok(Vec::new())
                } else {
                    parser.separated_by(Punctuation::Semicolon, Self::parse_top_level_expression)
                }
            },
        )?;

        Ok(Expression::ExpressionList {
            expressions,
            location,
        })
    }

    fn parse_not(&mut self) -> Result<Expression> {
        let location = self.lexer.expect(&operator(Operator::Not))?;
        let expression = self.parse_expression7()?;

        Ok(Expression::Not {
            expression: Box::new(expression),
            location,
        })
    }

    fn parse_argument_list(&mut self) -> Result<Vec<Expression>> {
        self.in_parens(|parser| {
            if parser
                .lexer
                .next_is(&punctuation(Punctuation::RightParen))?
            {
                Ok(Vec::new())
            } else {
                parser.separated_by(Punctuation::Comma, Self::parse_top_level_expression)
            }
        })
    }

    fn parse_argument_definition_list(&mut self) -> Result<Vec<(String, Type)>> {
        self.in_parens(|parser| {
            if parser
                .lexer
                .next_is(&punctuation(Punctuation::RightParen))?
            {
                Ok(Vec::new())
            } else {
                parser.separated_by(Punctuation::Comma, |parser| {
                    let (name, _) = parser.parse_name()?;
                    parser.lexer.expect(&punctuation(Punctuation::Colon))?;
                    let ty = parser.parse_type()?;
                    Ok((name, ty))
                })
            }
        })
    }

    fn parse_name(&mut self) -> Result<(String, SourceLocation)> {
        let info = self.lexer.read()?;
        match info.token {
            Token::Identifier(name) => Ok((name, info.location)),
            token => Err(CompileError::syntax(
                info.location,
                format!("expected identifier, but got {}", token),
            )),
        }
    }

    fn parse_type(&mut self) -> Result<Type> {
        let (name, location) = self.parse_name()?;
        match name.as_str() {
            "Unit" => Ok(Type::Unit),
            "Boolean" => Ok(Type::Boolean),
            "Int" => Ok(Type::Int),
            "String" => Ok(Type::String),
            _ => Err(CompileError::syntax(
                location,
                format!("unknown type name: '{}'", name),
            )),
        }
    }

    fn in_parens<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.between(Punctuation::LeftParen, Punctuation::RightParen, parse)
    }

    fn between<T>(
        &mut self,
        left: Punctuation,
        right: Punctuation,
        parse: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.lexer.expect(&punctuation(left))?;
        let value = parse(self)?;
        self.lexer.expect(&punctuation(right))?;
        Ok(value)
    }

    fn separated_by<T>(
        &mut self,
        separator: Punctuation,
        mut parse: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut result = vec![parse(self)?];
        while self.lexer.read_if(&punctuation(separator))? {
            result.push(parse(self)?);
        }
        Ok(result)
    }

    /// Fail unless all input has been consumed.
    pub fn expect_end(&mut self) -> Result<()> {
        if self.lexer.has_more() {
            let info = self.lexer.peek()?;
            return Err(CompileError::syntax(
                info.location.clone(),
                format!("expected end, but got {}", info.token),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_parse(source: &str, expected: &str) {
        let expression = parse_expression(source).unwrap();
        assert_eq!(expression.to_string(), expected, "{}", source);
    }

    fn assert_parse_definition(source: &str, expected: &str) {
        let definition = parse_function_definition(source).unwrap();
        assert_eq!(definition.to_string(), expected, "{}", source);
    }

    #[test]
    fn test_variables() {
        assert_parse("foo", "[Ref foo]");
    }

    #[test]
    fn test_literals() {
        assert_parse("42", "[Lit 42]");
        assert_parse("\"foo\"", "[Lit \"foo\"]");
        assert_parse("true", "[Lit true]");
    }

    #[test]
    fn test_if_statements() {
        assert_parse("if (x) y else z", "[If [Ref x] [Ref y] [Ref z]]");
        assert_parse("if (x) y", "[If [Ref x] [Ref y] []]");
    }

    #[test]
    fn test_unless_statements() {
        assert_parse("unless (x) y else z", "[If [Not [Ref x]] [Ref y] [Ref z]]");
        assert_parse("unless (x) y", "[If [Not [Ref x]] [Ref y] []]");
    }

    #[test]
    fn test_while_statements() {
        assert_parse("while (x) y", "[While [Ref x] [Ref y]]");
    }

    #[test]
    fn test_assignment_and_definitions() {
        assert_parse("foo = bar", "[Assign foo [Ref bar]]");
        assert_parse("var foo = bar", "[Var foo [Ref bar]]");
        assert_parse("val foo = bar", "[Val foo [Ref bar]]");
    }

    #[test]
    fn test_if_as_an_expression() {
        assert_parse(
            "1 + if (true) 2 else 3",
            "[Plus [Lit 1] [If [Lit true] [Lit 2] [Lit 3]]]",
        );
        assert_parse(
            "if (true) 2 else 3 + 4",
            "[If [Lit true] [Lit 2] [Plus [Lit 3] [Lit 4]]]",
        );
        assert_parse(
            "(if (true) 2 else 3) + 4",
            "[Plus [If [Lit true] [Lit 2] [Lit 3]] [Lit 4]]",
        );
        assert_parse(
            "1 + unless (true) 2 else 3",
            "[Plus [Lit 1] [If [Not [Lit true]] [Lit 2] [Lit 3]]]",
        );
    }

    #[test]
    fn test_expression_list() {
        assert_parse("{}", "[ExpressionList []]");
        assert_parse("{ x; y; z }", "[ExpressionList [[Ref x], [Ref y], [Ref z]]]");
    }

    #[test]
    fn test_assignment_to_literal_is_syntax_error() {
        let err = parse_expression("1 = bar;").unwrap_err();
        assert!(err.is_syntax());
        assert_eq!(err.message, "expected end, but got '='");
    }

    #[test]
    fn test_nested_assignment_is_not_recognized() {
        assert!(parse_expression("1 + x = 2").is_err());
    }

    #[test]
    fn test_binary_operators() {
        assert_parse("1 + 2", "[Plus [Lit 1] [Lit 2]]");
        assert_parse("1 - 2", "[Minus [Lit 1] [Lit 2]]");
        assert_parse("1 == 2", "[== [Lit 1] [Lit 2]]");
        assert_parse("1 != 2", "[!= [Lit 1] [Lit 2]]");
        assert_parse("1 < 2", "[< [Lit 1] [Lit 2]]");
        assert_parse("1 > 2", "[> [Lit 1] [Lit 2]]");
        assert_parse("1 <= 2", "[<= [Lit 1] [Lit 2]]");
        assert_parse("1 >= 2", "[>= [Lit 1] [Lit 2]]");
        assert_parse("true && false", "[And [Lit true] [Lit false]]");
        assert_parse("true || false", "[Or [Lit true] [Lit false]]");
    }

    #[test]
    fn test_not() {
        assert_parse("!x", "[Not [Ref x]]");
    }

    #[test]
    fn test_operator_precedence() {
        assert_parse(
            "a + b == c + d",
            "[== [Plus [Ref a] [Ref b]] [Plus [Ref c] [Ref d]]]",
        );
        assert_parse(
            "a + (b == c) + d",
            "[Plus [Plus [Ref a] [== [Ref b] [Ref c]]] [Ref d]]",
        );
        assert_parse("!x + y", "[Plus [Not [Ref x]] [Ref y]]");
        assert_parse("!(x + y)", "[Not [Plus [Ref x] [Ref y]]]");
        assert_parse(
            "a + b * c + d",
            "[Plus [Plus [Ref a] [Multiply [Ref b] [Ref c]]] [Ref d]]",
        );
        assert_parse("a == b < c", "[== [Ref a] [< [Ref b] [Ref c]]]");
        assert_parse(
            "a == b || c == d && e == f",
            "[Or [== [Ref a] [Ref b]] [And [== [Ref c] [Ref d]] [== [Ref e] [Ref f]]]]",
        );
    }

    #[test]
    fn test_function_call() {
        assert_parse("foo()", "[Call [Ref foo] []]");
        assert_parse("bar(1)", "[Call [Ref bar] [[Lit 1]]]");
        assert_parse("baz(1, x)", "[Call [Ref baz] [[Lit 1], [Ref x]]]");
        assert_parse("(baz)()", "[Call [Ref baz] []]");
    }

    #[test]
    fn test_function_definition() {
        assert_parse_definition(
            "fun square(x: Int, y: Int): Int = x * x",
            "FunctionDefinition(name=square, args=[(x, Int), (y, Int)], returnType=Int, body=[Multiply [Ref x] [Ref x]])",
        );
        assert_parse_definition(
            "fun square(x: Int) = x * x",
            "FunctionDefinition(name=square, args=[(x, Int)], returnType=null, body=[Multiply [Ref x] [Ref x]])",
        );
    }

    #[test]
    fn test_samples() {
        assert_parse(
            "if (x == 2 + 2) { var t = \"It\"; s = t + \" worked!\" }",
            "[If [== [Ref x] [Plus [Lit 2] [Lit 2]]] [ExpressionList [[Var t [Lit \"It\"]], [Assign s [Plus [Ref t] [Lit \" worked!\"]]]]] []]",
        );
        assert_parse_definition(
            "fun fib(i: Int): Int = if (i == 0 || i == 1)\n    i\nelse\n    fib(i-1) + fib(i-2)",
            "FunctionDefinition(name=fib, args=[(i, Int)], returnType=Int, body=[If [Or [== [Ref i] [Lit 0]] [== [Ref i] [Lit 1]]] [Ref i] [Plus [Call [Ref fib] [[Minus [Ref i] [Lit 1]]]] [Call [Ref fib] [[Minus [Ref i] [Lit 2]]]]]])",
        );
        assert_parse_definition(
            "fun cube(x: Int) = x * x * x",
            "FunctionDefinition(name=cube, args=[(x, Int)], returnType=null, body=[Multiply [Multiply [Ref x] [Ref x]] [Ref x]])",
        );
    }

    #[test]
    fn test_unknown_type_name() {
        let err = parse_function_definition("fun f(x: Float) = x").unwrap_err();
        assert_eq!(err.message, "unknown type name: 'Float'");
    }

    #[test]
    fn test_incomplete_input_is_unexpected_end() {
        assert!(parse_expression("if (x").unwrap_err().is_unexpected_end());
        assert!(parse_expression("{ var x = 1;").unwrap_err().is_unexpected_end());
    }

    #[test]
    fn test_multiple_definitions_with_file_name() {
        let definitions = parse_function_definitions(
            "fun one() = 1\nfun two(): Int = 2",
            "prelude.swona",
        )
        .unwrap();
        assert_eq!(definitions.len(), 2);
        assert_eq!(definitions[1].name, "two");

        let err = parse_function_definitions("fun () = 1", "prelude.swona").unwrap_err();
        assert_eq!(&*err.location.file, "prelude.swona");
    }

    #[test]
    fn test_call_location_is_callee_location() {
        let expression = parse_expression("  foo(1)").unwrap();
        assert_eq!(expression.location().column, 3);
    }
}
