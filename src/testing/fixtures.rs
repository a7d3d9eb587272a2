//! Sample ARFF documents for tests and doc examples.

use std::fmt::Write as _;

/// Two attributes, two rows, one missing value.
///
/// Converted to CSV it reads `a,b\n1.5,X\n,Y\n`.
pub const SCENARIO_ARFF: &str = "\
@relation test
@attribute a numeric
@attribute b {X,Y}
@data
1.5,X
?,Y
";

/// [`SCENARIO_ARFF`] plus a row whose nominal value (`Z`) is outside the
/// declared domain. The offending row is on line 7.
pub const SCENARIO_DOMAIN_VIOLATION_ARFF: &str = "\
@relation test
@attribute a numeric
@attribute b {X,Y}
@data
1.5,X
?,Y
2.0,Z
";

/// The classic weather dataset, with comments and blank lines in the header.
pub const WEATHER_ARFF: &str = "\
% Weather data for deciding whether to play outside.
% 14 instances.

@relation weather

@attribute outlook {sunny, overcast, rainy}
@attribute temperature real
@attribute humidity real
@attribute windy {TRUE, FALSE}
@attribute play {yes, no}

@data
sunny,85,85,FALSE,no
sunny,80,90,TRUE,no
overcast,83,86,FALSE,yes
rainy,70,96,FALSE,yes
rainy,68,80,FALSE,yes
rainy,65,70,TRUE,no
overcast,64,65,TRUE,yes
sunny,72,95,FALSE,no
sunny,69,70,FALSE,yes
rainy,75,80,FALSE,yes
sunny,75,70,TRUE,yes
overcast,72,90,TRUE,yes
% humidity unknown for this one
overcast,81,?,FALSE,yes
rainy,71,91,TRUE,no
";

/// Rows of [`MIXED_SPARSE_ARFF`] written densely.
pub const MIXED_DENSE_ARFF: &str = "\
@relation mixed
@attribute x numeric
@attribute n integer
@attribute label {low,high}
@attribute note string
@data
0,0,low,?
3.25,?,?,'hello, world'
?,7,high,?
?,?,?,?
";

/// Rows of [`MIXED_DENSE_ARFF`] written sparsely. Omitted indices are missing.
pub const MIXED_SPARSE_ARFF: &str = "\
@relation mixed
@attribute x numeric
@attribute n integer
@attribute label {low,high}
@attribute note string
@data
{0 0,1 0,2 low}
{0 3.25,3 'hello, world'}
{1 7,2 high}
{}
";

/// Dates, integers and strings that need quoting in every text format.
pub const EVENTS_ARFF: &str = "\
@relation 'server events'
@attribute id integer
@attribute at date \"yyyy-MM-dd HH:mm:ss\"
@attribute level {INFO,WARN,ERROR}
@attribute message string
@attribute latency numeric
@data
1,\"2024-03-01 08:15:00\",INFO,'service started',0.5
2,\"2024-03-01 08:16:30\",WARN,\"slow response, retrying\",1250
3,?,ERROR,'said \\'no\\' <again>',?
4,\"2024-03-02 00:00:00\",INFO,\"line\\nbreak\",2e3
";

/// A deterministic document of `rows` rows covering every attribute kind.
/// Every seventh row has missing values; every third is sparse.
#[must_use]
pub fn generated_arff(rows: usize) -> String {
    let mut out = String::from(
        "@relation generated\n\
         @attribute id integer\n\
         @attribute x numeric\n\
         @attribute label {A,B,C}\n\
         @attribute note string\n\
         @attribute day date yyyy-MM-dd\n\
         @data\n",
    );
    let labels = ["A", "B", "C"];
    for i in 0..rows {
        let x = (i as f64) * 0.25 - 10.0;
        let label = labels[i % labels.len()];
        let day = 1 + i % 28;
        if i % 7 == 6 {
            let _ = writeln!(out, "{i},?,{label},?,?");
        } else if i % 3 == 2 {
            let _ = writeln!(out, "{{0 {i},1 {x},2 {label},3 'row {i}, sparse',4 2024-02-{day:02}}}");
        } else {
            let _ = writeln!(out, "{i},{x},{label},\"row {i}\",2024-02-{day:02}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_document_has_requested_rows() {
        let doc = generated_arff(20);
        let data = doc.split("@data\n").nth(1).unwrap();
        assert_eq!(data.lines().count(), 20);
        assert!(data.lines().any(|l| l.starts_with('{')));
    }
}
