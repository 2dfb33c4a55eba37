//! Parse Information Element registry files using PEST.

use crate::model::{DataType, InfoElement, Semantic, Units, VARLEN};
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct RegistryParser;

/// Parse a registry file body into element definitions (in file order).
pub fn parse_registry(source: &str) -> Result<Vec<InfoElement>, String> {
    let pairs = RegistryParser::parse(Rule::registry, source)
        .map_err(|e| format!("Parse error: {}", e))?;
    let registry = pairs.into_iter().next().ok_or("Empty parse")?;
    let mut out = Vec::new();
    for inner in registry.into_inner() {
        if inner.as_rule() == Rule::element {
            out.push(build_element(inner)?);
        }
    }
    Ok(out)
}

fn build_element(pair: pest::iterators::Pair<Rule>) -> Result<InfoElement, String> {
    let line = pair.as_span().start_pos().line_col().0;
    let mut it = pair.into_inner();
    let name = it.next().ok_or("element: missing name")?.as_str().to_string();
    let (ent, id) = build_element_id(it.next().ok_or("element: missing id")?)
        .map_err(|e| format!("line {}: {}: {}", line, name, e))?;
    let type_pair = it.next().ok_or("element: missing type")?;
    let data_type = DataType::from_name(type_pair.as_str())
        .ok_or_else(|| format!("line {}: {}: unknown type {}", line, name, type_pair.as_str()))?;
    let mut ie = InfoElement::new(name, ent, id).data_type(data_type);
    for part in it {
        match part.as_rule() {
            Rule::length => ie.length = build_length(part)?,
            Rule::endian_flag => ie.endian = true,
            Rule::reversible_flag => ie.reversible = true,
            Rule::semantic_attr => {
                let w = single_inner(part)?;
                ie.semantic = Semantic::from_name(w)
                    .ok_or_else(|| format!("line {}: unknown semantic {}", line, w))?;
            }
            Rule::units_attr => {
                let w = single_inner(part)?;
                ie.units = Units::from_name(w)
                    .ok_or_else(|| format!("line {}: unknown units {}", line, w))?;
            }
            Rule::range_attr => {
                let mut nums = part.into_inner();
                let min = parse_number(nums.next().ok_or("range: min")?.as_str())?;
                let max = parse_number(nums.next().ok_or("range: max")?.as_str())?;
                ie.min = min;
                ie.max = max;
            }
            Rule::desc_attr => {
                let s = part.into_inner().next().ok_or("desc: string")?;
                let inner = s.into_inner().next().map(|p| p.as_str()).unwrap_or("");
                ie.description = Some(unescape(inner));
            }
            _ => {}
        }
    }
    Ok(ie)
}

fn build_element_id(pair: pest::iterators::Pair<Rule>) -> Result<(u32, u16), String> {
    let mut ent = 0u32;
    let mut id = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::enterprise => {
                ent = part
                    .as_str()
                    .parse()
                    .map_err(|_| format!("enterprise number {} out of range", part.as_str()))?
            }
            Rule::number => id = Some(parse_number(part.as_str())?),
            _ => {}
        }
    }
    let id = id.ok_or("missing element id")?;
    if id > 0x7fff {
        return Err(format!("element id {} exceeds 32767", id));
    }
    Ok((ent, id as u16))
}

fn build_length(pair: pest::iterators::Pair<Rule>) -> Result<u16, String> {
    let inner = pair.into_inner().next().ok_or("length: empty")?;
    match inner.as_rule() {
        Rule::varlen_kw => Ok(VARLEN),
        _ => {
            let n = parse_number(inner.as_str())?;
            u16::try_from(n).map_err(|_| format!("length {} exceeds 65535", n))
        }
    }
}

fn single_inner<'i>(pair: pest::iterators::Pair<'i, Rule>) -> Result<&'i str, String> {
    pair.into_inner()
        .next()
        .map(|p| p.as_str())
        .ok_or_else(|| "attribute: missing value".to_string())
}

fn parse_number(s: &str) -> Result<u64, String> {
    s.parse::<u64>().map_err(|_| format!("number {} out of range", s))
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}
