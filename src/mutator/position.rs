//! Placement of replacement and warning text

use crate::document::Element;

/// Anchor point of a marked node, as attribute text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub x: String,
    pub y: String,
}

impl Position {
    pub fn origin() -> Self {
        Self {
            x: "0".to_string(),
            y: "0".to_string(),
        }
    }

    /// This point moved `dx` to the right. Coordinates that are not plain
    /// numbers put the point at the origin first.
    pub fn shifted(&self, dx: f64) -> Position {
        let (x, y) = match (self.x.trim().parse::<f64>(), self.y.trim().parse::<f64>()) {
            (Ok(x), Ok(y)) => (x, y),
            _ => (0.0, 0.0),
        };
        Position {
            x: (x + dx).to_string(),
            y: y.to_string(),
        }
    }
}

/// Where text replacing `element` should go.
///
/// Paths use the first coordinate pair of their `d` data; everything else
/// uses its `x`/`y` attributes. Anything that cannot be read is `0`.
pub fn infer_position(element: &Element) -> Position {
    if element.local_name() == "path" {
        return element
            .attr("d")
            .and_then(first_path_point)
            .unwrap_or_else(Position::origin);
    }

    let coordinate = |name: &str| {
        element
            .attr(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or("0")
            .to_string()
    };
    Position {
        x: coordinate("x"),
        y: coordinate("y"),
    }
}

/// First two numbers after the leading command letter of path data.
///
/// Best effort: this reads the usual "move then first point" shape and
/// nothing more. Relative and absolute commands are not distinguished.
fn first_path_point(d: &str) -> Option<Position> {
    let rest = d.trim_start();
    let mut chars = rest.chars();
    if !chars.next()?.is_ascii_alphabetic() {
        return None;
    }

    let mut numbers = NumberScanner::new(chars.as_str());
    let x = numbers.next()?;
    let y = numbers.next()?;
    Some(Position {
        x: x.to_string(),
        y: y.to_string(),
    })
}

/// Splits path data into number literals, stopping at the next command
struct NumberScanner<'a> {
    rest: &'a str,
}

impl<'a> NumberScanner<'a> {
    fn new(input: &'a str) -> Self {
        Self { rest: input }
    }
}

impl<'a> Iterator for NumberScanner<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        self.rest = self
            .rest
            .trim_start_matches(|c: char| c.is_whitespace() || c == ',');

        let bytes = self.rest.as_bytes();
        let mut end = 0;
        if matches!(bytes.first(), Some(b'-' | b'+')) {
            end += 1;
        }
        let mut seen_dot = false;
        let mut seen_digit = false;
        while let Some(&b) = bytes.get(end) {
            match b {
                b'0'..=b'9' => seen_digit = true,
                b'.' if !seen_dot => seen_dot = true,
                _ => break,
            }
            end += 1;
        }
        if !seen_digit {
            return None;
        }
        // exponent
        if matches!(bytes.get(end), Some(b'e' | b'E')) {
            let mut exp_end = end + 1;
            if matches!(bytes.get(exp_end), Some(b'-' | b'+')) {
                exp_end += 1;
            }
            let digits_start = exp_end;
            while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
                exp_end += 1;
            }
            if exp_end > digits_start {
                end = exp_end;
            }
        }

        let (number, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(number)
    }
}
