// Copyright © 2018 Cormac O'Brien
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Entity lump parsing.
//!
//! The parser works line by line. A line consisting of `{` opens an entity and a line consisting
//! of `}` closes it. Any other line inside an entity is scanned for two quoted strings, the key and
//! the value. Lines without two quoted strings are skipped. Later values replace earlier ones for
//! the same key.

use std::collections::HashMap;

use nom::{
    bytes::complete::{tag, take_until},
    sequence::{delimited, pair, preceded},
};

pub type Entity = HashMap<String, String>;

// skips anything up to the next quote, then takes the quoted text
fn next_quoted(input: &str) -> nom::IResult<&str, &str> {
    preceded(
        take_until("\""),
        delimited(tag("\""), take_until("\""), tag("\"")),
    )(input)
}

/// Extracts the key and value from an entity attribute line.
pub fn key_value(line: &str) -> Option<(&str, &str)> {
    pair(next_quoted, next_quoted)(line)
        .ok()
        .map(|(_, kv)| kv)
}

/// Parses the text of an entity lump into a list of entities.
pub fn parse_entities(text: &str) -> Vec<Entity> {
    let mut entities = Vec::new();
    let mut current: Option<Entity> = None;

    for (n, line) in text.lines().enumerate() {
        match line {
            "{" => {
                if current.is_some() {
                    warn!("Entity opened on line {} before the previous one closed", n + 1);
                }
                current = Some(Entity::new());
            }

            "}" => match current.take() {
                Some(ent) => entities.push(ent),
                None => debug!("Skipping unmatched closing brace on line {}", n + 1),
            },

            _ => match (current.as_mut(), key_value(line)) {
                (Some(ent), Some((key, value))) => {
                    ent.insert(key.to_owned(), value.to_owned());
                }

                (None, _) if line.trim().is_empty() => (),

                _ => debug!("Skipping entity line {}: {:?}", n + 1, line),
            },
        }
    }

    if current.is_some() {
        warn!("Entity lump ends inside an entity");
    }

    entities
}

/// Returns the entities whose `classname` is `class`.
pub fn entities_of_class<'a>(
    entities: &'a [Entity],
    class: &'a str,
) -> impl Iterator<Item = &'a Entity> + 'a {
    entities
        .iter()
        .filter(move |e| e.get("classname").map(|c| c.as_str()) == Some(class))
}
