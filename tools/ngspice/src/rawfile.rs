//! ASCII rawfile parsing.
//!
//! Batch runs write their saved vectors as an ASCII nutmeg rawfile (the
//! control block sets `filetype=ascii`). This parses the subset ngspice
//! emits: one block of headers, variable declarations, and point values
//! per analysis, real for transient and complex for AC sweeps.

use nom::branch::alt;
use nom::bytes::complete::{tag_no_case, take_till1};
use nom::character::complete::{char, digit1, line_ending, multispace0, not_line_ending, space0, space1};
use nom::combinator::{map_res, opt};
use nom::multi::{count, many1};
use nom::number::complete::double;
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom::IResult;

use crate::error::Error;

/// One parsed analysis block.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAnalysis<'a> {
    /// The plot name, e.g. `Transient Analysis` or `AC Analysis`.
    pub plotname: &'a str,
    /// The flags line, `real` or `complex`.
    pub flags: &'a str,
    /// Saved variable names in declaration order; index 0 is the sweep.
    pub variables: Vec<&'a str>,
    /// Saved data, one vector per variable.
    pub data: RawData,
}

/// Data vectors of one analysis, transposed to per-variable order.
#[derive(Debug, Clone, PartialEq)]
pub enum RawData {
    /// Real samples per variable.
    Real(Vec<Vec<f64>>),
    /// Complex samples per variable.
    Complex {
        /// Real parts per variable.
        real: Vec<Vec<f64>>,
        /// Imaginary parts per variable.
        imag: Vec<Vec<f64>>,
    },
}

/// Parses a complete ASCII rawfile.
pub fn parse(input: &str) -> crate::error::Result<Vec<RawAnalysis<'_>>> {
    match terminated(many1(analysis), multispace0)(input) {
        Ok((rest, analyses)) if rest.is_empty() => Ok(analyses),
        Ok((rest, _)) => Err(Error::RawfileParse(format!(
            "trailing data: {:.60}",
            rest
        ))),
        Err(e) => Err(Error::RawfileParse(e.to_string())),
    }
}

fn header<'a>(key: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input| {
        delimited(
            pair(tag_no_case(key), space0),
            not_line_ending,
            line_ending,
        )(input)
    }
}

fn usize_header<'a>(key: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, usize> {
    move |input| map_res(header(key), |s: &str| s.trim().parse::<usize>())(input)
}

fn variable(input: &str) -> IResult<&str, &str> {
    let token = |i| take_till1(|c: char| c.is_whitespace())(i);
    let (input, (_, _, _, name, _, _)) = tuple((
        space0,
        digit1,
        space1,
        token,
        not_line_ending,
        line_ending,
    ))(input)?;
    Ok((input, name))
}

fn real_point(input: &str, nvars: usize) -> IResult<&str, Vec<f64>> {
    let (input, _) = preceded(multispace0, digit1)(input)?;
    count(preceded(multispace0, double), nvars)(input)
}

fn complex_point(input: &str, nvars: usize) -> IResult<&str, Vec<(f64, f64)>> {
    let (input, _) = preceded(multispace0, digit1)(input)?;
    count(
        preceded(
            multispace0,
            tuple((double, char(','), double)),
        ),
        nvars,
    )(input)
    .map(|(rest, points)| (rest, points.into_iter().map(|(re, _, im)| (re, im)).collect()))
}

fn analysis(input: &str) -> IResult<&str, RawAnalysis<'_>> {
    let (input, _) = multispace0(input)?;
    let (input, _) = opt(header("Title:"))(input)?;
    let (input, _) = opt(header("Date:"))(input)?;
    let (input, plotname) = header("Plotname:")(input)?;
    let (input, flags) = header("Flags:")(input)?;
    let (input, nvars) = usize_header("No. Variables:")(input)?;
    let (input, npoints) = usize_header("No. Points:")(input)?;
    let (input, _) = opt(header("Command:"))(input)?;
    let (input, _) = opt(header("Option:"))(input)?;
    let (input, _) = preceded(space0, pair(tag_no_case("Variables:"), line_ending))(input)?;
    let (input, variables) = count(variable, nvars)(input)?;
    let (input, _) = preceded(space0, pair(tag_no_case("Values:"), opt(line_ending)))(input)?;

    let complex = flags.to_ascii_lowercase().contains("complex");
    let mut rest = input;
    let data = if complex {
        let mut real = vec![Vec::with_capacity(npoints); nvars];
        let mut imag = vec![Vec::with_capacity(npoints); nvars];
        for _ in 0..npoints {
            let (r, point) = complex_point(rest, nvars)?;
            rest = r;
            for (k, (re, im)) in point.into_iter().enumerate() {
                real[k].push(re);
                imag[k].push(im);
            }
        }
        RawData::Complex { real, imag }
    } else {
        let mut values = vec![Vec::with_capacity(npoints); nvars];
        for _ in 0..npoints {
            let (r, point) = real_point(rest, nvars)?;
            rest = r;
            for (k, v) in point.into_iter().enumerate() {
                values[k].push(v);
            }
        }
        RawData::Real(values)
    };
    let (rest, _) = alt((line_ending, multispace0))(rest)?;
    Ok((
        rest,
        RawAnalysis {
            plotname,
            flags,
            variables,
            data,
        },
    ))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    const TRAN: &str = "Title: tb\nDate: today\nPlotname: Transient Analysis\nFlags: real\nNo. Variables: 3\nNo. Points: 2\nVariables:\n\t0\ttime\ttime\n\t1\tv(a)\tvoltage\n\t2\tv(y)\tvoltage\nValues:\n 0\t0.0\n\t0.0\n\t1.1\n 1\t1e-12\n\t1.1\n\t0.0\n";

    #[test]
    fn parses_a_real_transient_block() {
        let analyses = parse(TRAN).unwrap();
        assert_eq!(analyses.len(), 1);
        let a = &analyses[0];
        assert_eq!(a.plotname, "Transient Analysis");
        assert_eq!(a.variables, ["time", "v(a)", "v(y)"]);
        match &a.data {
            RawData::Real(values) => {
                assert_eq!(values[0], vec![0.0, 1e-12]);
                assert_eq!(values[1], vec![0.0, 1.1]);
                assert_eq!(values[2], vec![1.1, 0.0]);
            }
            _ => panic!("expected real data"),
        }
    }

    #[test]
    fn parses_a_complex_ac_block() {
        let src = "Plotname: AC Analysis\nFlags: complex\nNo. Variables: 2\nNo. Points: 2\nVariables:\n\t0\tfrequency\tfrequency grid=3\n\t1\tv(a)\tvoltage\nValues:\n 0\t1e1,0.0\n\t0.5,-0.5\n 1\t1e2,0.0\n\t0.25,-0.25\n";
        let analyses = parse(src).unwrap();
        let a = &analyses[0];
        match &a.data {
            RawData::Complex { real, imag } => {
                assert_relative_eq!(real[0][1], 100.0);
                assert_relative_eq!(imag[1][0], -0.5);
            }
            _ => panic!("expected complex data"),
        }
    }

    #[test]
    fn parses_consecutive_analyses() {
        let mut src = String::from(TRAN);
        src.push_str(TRAN);
        assert_eq!(parse(&src).unwrap().len(), 2);
    }

    #[test]
    fn truncated_input_is_an_error() {
        assert!(parse(&TRAN[..TRAN.len() - 10]).is_err());
    }
}
