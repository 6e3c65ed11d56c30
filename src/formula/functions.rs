//! DAX function table.
//!
//! Every entry receives its compiled arguments and returns `Ok(None)` when the
//! name is unknown, so the caller can report it as unsupported.

use chrono::{Local, Utc};
use polars::prelude::*;

use super::compiler::Value;
use super::{FormulaError, temporal};

type Out = Result<Option<Value>, FormulaError>;

/// Compiled call arguments plus the signature used in error messages.
struct Args {
    values: Vec<Value>,
    signature: &'static str,
}

impl Args {
    fn new(values: Vec<Value>, min: usize, signature: &'static str) -> Result<Self, FormulaError> {
        if values.len() < min {
            return Err(FormulaError::ArgumentCount(signature));
        }
        Ok(Self { values, signature })
    }

    fn at(&self, index: usize) -> Result<&Value, FormulaError> {
        self.values
            .get(index)
            .ok_or(FormulaError::ArgumentCount(self.signature))
    }

    fn opt(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// A column argument. Bare text names a column too.
    fn column(&self, index: usize) -> Result<Expr, FormulaError> {
        Ok(match self.at(index)? {
            Value::Text(name) | Value::Constant(name) | Value::Column(name) => col(name.as_str()),
            Value::Integer(i) => col(i.to_string()),
            Value::Float(f) => col(f.to_string()),
            other => other.clone().into_expr(),
        })
    }

    /// A column whose text values are read as numbers, with `true` counting as 1.
    fn text_as_number(&self, index: usize) -> Result<Expr, FormulaError> {
        let text = self.column(index)?.cast(DataType::String);
        let is_true = text
            .clone()
            .str()
            .strip_chars(lit(NULL))
            .str()
            .to_lowercase()
            .eq(lit("true"));
        Ok(when(is_true)
            .then(lit("1"))
            .otherwise(text)
            .cast(DataType::Float64))
    }

    fn numeric(&self, index: usize) -> Result<Expr, FormulaError> {
        Ok(self.at(index)?.clone().into_expr())
    }

    fn float(&self, index: usize) -> Result<Expr, FormulaError> {
        Ok(self.numeric(index)?.cast(DataType::Float64))
    }

    /// Bare text names a column here, unlike in numeric arguments.
    fn logical(&self, index: usize) -> Result<Expr, FormulaError> {
        Ok(match self.at(index)? {
            Value::Text(name) => col(name.as_str()),
            other => other.clone().into_expr(),
        })
    }

    fn datetime(&self, index: usize) -> Result<Expr, FormulaError> {
        Ok(datetime_value(self.at(index)?.clone()).into_expr())
    }

    fn time(&self, index: usize) -> Result<Expr, FormulaError> {
        Ok(match self.at(index)?.clone() {
            Value::Text(text) => match temporal::parse_time(&text) {
                Some(time) => Value::Time(time),
                None => datetime_value(Value::Text(text)),
            },
            other => other,
        }
        .into_expr())
    }

    fn integer(&self, index: usize) -> Result<i64, FormulaError> {
        let invalid = FormulaError::ArgumentType(index + 1, self.signature);
        match self.at(index)? {
            Value::Integer(i) => Ok(*i),
            Value::Float(f) => Ok(*f as i64),
            Value::Text(text) => text.trim().parse().map_err(|_| invalid),
            _ => Err(invalid),
        }
    }

    fn keyword(&self, index: usize) -> Result<String, FormulaError> {
        match self.at(index)? {
            Value::Constant(s) | Value::Text(s) => Ok(s.to_uppercase()),
            _ => Err(FormulaError::ArgumentType(index + 1, self.signature)),
        }
    }
}

fn datetime_value(value: Value) -> Value {
    match value {
        Value::Text(text) => match temporal::parse_datetime(&text) {
            Some(datetime) => Value::Datetime(datetime),
            None => Value::Text(text),
        },
        other => other,
    }
}

fn make_date(year: Expr, month: Expr, day: Expr) -> Expr {
    datetime(DatetimeArgs::new(year, month, day)).cast(DataType::Date)
}

fn some(expr: Expr) -> Out {
    Ok(Some(Value::Expr(expr)))
}

pub(super) fn dax(name: &str, args: Vec<Value>) -> Out {
    match name {
        // Aggregation
        "APPROXIMATEDISTINCTCOUNT" => {
            let a = Args::new(args, 1, "APPROXIMATEDISTINCTCOUNT(column)")?;
            some(a.column(0)?.approx_n_unique())
        }
        "AVERAGE" => {
            let a = Args::new(args, 1, "AVERAGE(column)")?;
            some(a.column(0)?.cast(DataType::Float64).mean())
        }
        "AVERAGEA" => {
            let a = Args::new(args, 1, "AVERAGEA(column)")?;
            some(a.text_as_number(0)?.mean())
        }
        "COUNT" => {
            let a = Args::new(args, 1, "COUNT(column)")?;
            some(a.column(0)?.count())
        }
        "COUNTA" => {
            let a = Args::new(args, 1, "COUNTA(column)")?;
            some(a.text_as_number(0)?.count())
        }
        "COUNTBLANK" => {
            let a = Args::new(args, 1, "COUNTBLANK(column)")?;
            some(a.column(0)?.null_count())
        }
        "COUNTROWS" => some(len()),
        "DISTINCTCOUNT" => {
            let a = Args::new(args, 1, "DISTINCTCOUNT(column)")?;
            some(a.column(0)?.n_unique())
        }
        "DISTINCTCOUNTNOBLANK" => {
            let a = Args::new(args, 1, "DISTINCTCOUNTNOBLANK(column)")?;
            let column = a.column(0)?;
            let has_blank = column.clone().null_count().gt(lit(0)).cast(IDX_DTYPE);
            some(column.n_unique() - has_blank)
        }
        "MAX" => {
            let a = Args::new(args, 1, "MAX(column)")?;
            some(a.column(0)?.max())
        }
        "MAXA" => {
            let a = Args::new(args, 1, "MAXA(column)")?;
            some(a.text_as_number(0)?.max())
        }
        "MIN" => {
            let a = Args::new(args, 1, "MIN(column)")?;
            some(a.column(0)?.min())
        }
        "MINA" => {
            let a = Args::new(args, 1, "MINA(column)")?;
            some(a.text_as_number(0)?.min())
        }
        "PRODUCT" => {
            let a = Args::new(args, 1, "PRODUCT(column)")?;
            some(a.column(0)?.product())
        }
        "SUM" => {
            let a = Args::new(args, 1, "SUM(column)")?;
            some(a.column(0)?.sum())
        }

        // Date and time
        "DATE" => {
            let a = Args::new(args, 3, "DATE(year, month, day)")?;
            some(make_date(a.numeric(0)?, a.numeric(1)?, a.numeric(2)?))
        }
        "DATEDIFF" => date_diff(&Args::new(args, 3, "DATEDIFF(date1, date2, interval)")?),
        "DATEVALUE" => {
            let a = Args::new(args, 1, "DATEVALUE(date_text)")?;
            some(a.datetime(0)?.cast(DataType::Date))
        }
        "DAY" => {
            let a = Args::new(args, 1, "DAY(datetime)")?;
            some(a.datetime(0)?.dt().day())
        }
        "EDATE" => {
            let a = Args::new(args, 2, "EDATE(start_date, months)")?;
            let months = a.integer(1)?;
            some(
                a.datetime(0)?
                    .dt()
                    .offset_by(lit(format!("{months}mo")))
                    .cast(DataType::Date),
            )
        }
        "EOMONTH" => {
            let a = Args::new(args, 2, "EOMONTH(start_date, months)")?;
            let months = a.integer(1)?;
            some(
                a.datetime(0)?
                    .dt()
                    .offset_by(lit(format!("{months}mo")))
                    .dt()
                    .month_end()
                    .cast(DataType::Date),
            )
        }
        "HOUR" => {
            let a = Args::new(args, 1, "HOUR(datetime)")?;
            some(a.time(0)?.dt().hour())
        }
        "MINUTE" => {
            let a = Args::new(args, 1, "MINUTE(datetime)")?;
            some(a.time(0)?.dt().minute())
        }
        "MONTH" => {
            let a = Args::new(args, 1, "MONTH(datetime)")?;
            some(a.datetime(0)?.dt().month())
        }
        "NOW" => some(lit(Local::now().naive_local())),
        "QUARTER" => {
            let a = Args::new(args, 1, "QUARTER(datetime)")?;
            some(a.datetime(0)?.dt().quarter())
        }
        "SECOND" => {
            let a = Args::new(args, 1, "SECOND(datetime)")?;
            some(a.time(0)?.dt().second())
        }
        "TIME" => {
            let a = Args::new(args, 3, "TIME(hour, minute, second)")?;
            let args = DatetimeArgs::new(lit(1970), lit(1), lit(1)).with_hms(
                a.numeric(0)?,
                a.numeric(1)?,
                a.numeric(2)?,
            );
            some(datetime(args).cast(DataType::Time))
        }
        "TIMEVALUE" => {
            let a = Args::new(args, 1, "TIMEVALUE(time_text)")?;
            some(a.time(0)?.cast(DataType::Time))
        }
        "TODAY" => some(lit(Local::now().date_naive())),
        "UTCNOW" => some(lit(Utc::now().naive_utc()).cast(DataType::Datetime(
            TimeUnit::Microseconds,
            Some("UTC".into()),
        ))),
        "UTCTODAY" => some(lit(Utc::now().date_naive())),
        "WEEKDAY" => {
            let a = Args::new(args, 1, "WEEKDAY(date, [return_type])")?;
            let return_type = match a.opt(1) {
                Some(_) => a.integer(1)?.clamp(1, 3),
                None => 1,
            };
            let weekday = a.datetime(0)?.dt().weekday();
            some(match return_type {
                1 => weekday % lit(7) + lit(1),
                2 => weekday,
                _ => weekday - lit(1),
            })
        }
        "WEEKNUM" => {
            let a = Args::new(args, 1, "WEEKNUM(date)")?;
            some(a.datetime(0)?.dt().week())
        }
        "YEAR" => {
            let a = Args::new(args, 1, "YEAR(datetime)")?;
            some(a.datetime(0)?.dt().year())
        }

        // Time intelligence
        "DATEADD" => {
            let a = Args::new(args, 3, "DATEADD(dates, number_of_intervals, interval)")?;
            let count = a.integer(1)?;
            let unit = match a.keyword(2)?.as_str() {
                "YEAR" => "y",
                "QUARTER" => "q",
                "MONTH" => "mo",
                "DAY" => "d",
                _ => return Err(FormulaError::ArgumentType(3, a.signature)),
            };
            some(
                a.datetime(0)?
                    .dt()
                    .offset_by(lit(format!("{count}{unit}")))
                    .cast(DataType::Date),
            )
        }
        "ENDOFMONTH" => {
            let a = Args::new(args, 1, "ENDOFMONTH(dates)")?;
            some(a.datetime(0)?.dt().month_end().cast(DataType::Date))
        }
        "ENDOFQUARTER" => {
            let a = Args::new(args, 1, "ENDOFQUARTER(dates)")?;
            some(quarter_bound(a.datetime(0)?, [(3, 31), (6, 30), (9, 30), (12, 31)]))
        }
        "ENDOFYEAR" => year_bound(&Args::new(args, 1, "ENDOFYEAR(dates, [year_end_date])")?, true),
        "FIRSTDATE" => {
            let a = Args::new(args, 1, "FIRSTDATE(dates)")?;
            let dates = a.datetime(0)?;
            some(if a.at(0)?.is_column() {
                dates.min()
            } else {
                dates.cast(DataType::Date)
            })
        }
        "LASTDATE" => {
            let a = Args::new(args, 1, "LASTDATE(dates)")?;
            let dates = a.datetime(0)?;
            some(if a.at(0)?.is_column() {
                dates.max()
            } else {
                dates.cast(DataType::Date)
            })
        }
        "STARTOFMONTH" => {
            let a = Args::new(args, 1, "STARTOFMONTH(dates)")?;
            some(a.datetime(0)?.dt().month_start().cast(DataType::Date))
        }
        "STARTOFQUARTER" => {
            let a = Args::new(args, 1, "STARTOFQUARTER(dates)")?;
            some(quarter_bound(a.datetime(0)?, [(1, 1), (4, 1), (7, 1), (10, 1)]))
        }
        "STARTOFYEAR" => {
            year_bound(&Args::new(args, 1, "STARTOFYEAR(dates, [year_end_date])")?, false)
        }

        // Logical
        "AND" => {
            let a = Args::new(args, 2, "AND(logical1, logical2)")?;
            some(a.logical(0)?.and(a.logical(1)?))
        }
        "BITAND" => {
            let a = Args::new(args, 2, "BITAND(number1, number2)")?;
            some(a.logical(0)?.and(a.logical(1)?))
        }
        "BITOR" => {
            let a = Args::new(args, 2, "BITOR(number1, number2)")?;
            some(a.logical(0)?.or(a.logical(1)?))
        }
        "BITXOR" => {
            let a = Args::new(args, 2, "BITXOR(number1, number2)")?;
            some(a.logical(0)?.xor(a.logical(1)?))
        }
        "FALSE" => some(lit(false)),
        "NOT" => {
            let a = Args::new(args, 1, "NOT(logical)")?;
            some(a.logical(0)?.not())
        }
        "OR" => {
            let a = Args::new(args, 2, "OR(logical1, logical2)")?;
            some(a.logical(0)?.or(a.logical(1)?))
        }
        "TRUE" => some(lit(true)),

        // Math and trigonometry
        "ABS" => unary(args, "ABS(number)", Expr::abs),
        "ACOS" => trig(args, "ACOS(number)", Expr::arccos),
        "ACOSH" => trig(args, "ACOSH(number)", Expr::arccosh),
        "ACOT" => trig(args, "ACOT(number)", |e| (lit(1.0) / e).arctan()),
        "ACOTH" => trig(args, "ACOTH(number)", |e| (lit(1.0) / e).arctanh()),
        "ASIN" => trig(args, "ASIN(number)", Expr::arcsin),
        "ASINH" => trig(args, "ASINH(number)", Expr::arcsinh),
        "ATAN" => trig(args, "ATAN(number)", Expr::arctan),
        "ATANH" => trig(args, "ATANH(number)", Expr::arctanh),
        "COS" => trig(args, "COS(number)", Expr::cos),
        "COSH" => trig(args, "COSH(number)", Expr::cosh),
        "COT" => trig(args, "COT(number)", |e| lit(1.0) / e.tan()),
        "DEGREES" => trig(args, "DEGREES(angle)", Expr::degrees),
        "DIVIDE" => {
            let a = Args::new(args, 2, "DIVIDE(numerator, denominator, [alternateresult])")?;
            let numerator = a.numeric(0)?.strict_cast(DataType::Float64);
            let denominator = a.numeric(1)?.strict_cast(DataType::Float64);
            let alternate = match a.opt(2) {
                Some(_) => a.numeric(2)?,
                None => lit(NULL),
            };
            some((numerator / denominator).fill_nan(alternate))
        }
        "EVEN" => unary(args, "EVEN(number)", |e| round_to_parity(e, false)),
        "EXP" => trig(args, "EXP(number)", Expr::exp),
        "LN" => trig(args, "LN(number)", |e| e.log(std::f64::consts::E)),
        "LOG" => {
            let a = Args::new(args, 1, "LOG(number, [base])")?;
            let base = match a.opt(1) {
                Some(Value::Integer(i)) => *i as f64,
                Some(Value::Float(f)) => *f,
                Some(_) => return Err(FormulaError::ArgumentType(2, a.signature)),
                None => std::f64::consts::E,
            };
            some(a.float(0)?.log(base))
        }
        "LOG10" => trig(args, "LOG10(number)", |e| e.log(10.0)),
        "ODD" => unary(args, "ODD(number)", |e| round_to_parity(e, true)),
        "PI" => some(lit(std::f64::consts::PI)),
        "POWER" => {
            let a = Args::new(args, 2, "POWER(number, power)")?;
            some(a.numeric(0)?.pow(a.numeric(1)?))
        }
        "RADIANS" => trig(args, "RADIANS(angle)", Expr::radians),
        "SIGN" => unary(args, "SIGN(number)", Expr::sign),
        "SIN" => trig(args, "SIN(number)", Expr::sin),
        "SINH" => trig(args, "SINH(number)", Expr::sinh),
        "SQRT" => trig(args, "SQRT(number)", Expr::sqrt),
        "SQRTPI" => trig(args, "SQRTPI(number)", |e| {
            (e * lit(std::f64::consts::PI)).sqrt()
        }),
        "TAN" => trig(args, "TAN(number)", Expr::tan),
        "TANH" => trig(args, "TANH(number)", Expr::tanh),

        // Text
        "LEN" => unary(args, "LEN(text)", |e| {
            e.cast(DataType::String).str().len_chars()
        }),
        "LOWER" => unary(args, "LOWER(text)", |e| {
            e.cast(DataType::String).str().to_lowercase()
        }),
        "UPPER" => unary(args, "UPPER(text)", |e| {
            e.cast(DataType::String).str().to_uppercase()
        }),
        "VALUE" => unary(args, "VALUE(text)", |e| e.strict_cast(DataType::Float64)),

        "BLANK" => some(lit(NULL)),

        _ => Ok(None),
    }
}

/// One numeric argument passed through `f`.
fn unary(args: Vec<Value>, signature: &'static str, f: impl FnOnce(Expr) -> Expr) -> Out {
    let a = Args::new(args, 1, signature)?;
    some(f(a.numeric(0)?))
}

/// Like [`unary`], with the argument read as a float first.
fn trig(args: Vec<Value>, signature: &'static str, f: impl FnOnce(Expr) -> Expr) -> Out {
    let a = Args::new(args, 1, signature)?;
    some(f(a.float(0)?))
}

fn round_to_parity(number: Expr, odd: bool) -> Expr {
    let number = number.cast(DataType::Float64);
    let fix = |rounded: Expr, step: f64| {
        let remainder = rounded.clone() % lit(2.0);
        let wrong = if odd {
            remainder.eq(lit(0.0))
        } else {
            remainder.neq(lit(0.0))
        };
        when(wrong)
            .then(rounded.clone() + lit(step))
            .otherwise(rounded)
    };
    when(number.clone().gt_eq(lit(0.0)))
        .then(fix(number.clone().ceil(), 1.0))
        .otherwise(fix(number.floor(), -1.0))
        .cast(DataType::Int64)
}

fn quarter_bound(dates: Expr, bounds: [(i32, i32); 4]) -> Expr {
    let year = dates.clone().dt().year();
    let quarter = dates.dt().quarter();
    let [q1, q2, q3, q4] = bounds.map(|(month, day)| make_date(year.clone(), lit(month), lit(day)));
    when(quarter.clone().eq(lit(1)))
        .then(q1)
        .when(quarter.clone().eq(lit(2)))
        .then(q2)
        .when(quarter.eq(lit(3)))
        .then(q3)
        .otherwise(q4)
}

/// End of the fiscal year a date falls in, or the start when `end` is false.
///
/// The fiscal year ends on the month and day of the optional second argument
/// and on December 31 otherwise.
fn year_bound(a: &Args, end: bool) -> Out {
    let dates = a.datetime(0)?;
    let (end_month, end_day) = match a.opt(1) {
        Some(_) => {
            let year_end = a.datetime(1)?;
            (year_end.clone().dt().month(), year_end.dt().day())
        }
        None => (lit(12), lit(31)),
    };
    let year = dates.clone().dt().year();
    let month = dates.clone().dt().month();
    let day = dates.dt().day();
    let before_year_end = month
        .clone()
        .lt(end_month.clone())
        .or(month.eq(end_month.clone()).and(day.lt_eq(end_day.clone())));

    let bound = |year: Expr| {
        let date = make_date(year, end_month.clone(), end_day.clone());
        if end {
            date
        } else {
            date.dt().offset_by(lit("1d"))
        }
    };
    let (this_year, other_year) = if end {
        (bound(year.clone()), bound(year + lit(1)))
    } else {
        (bound(year.clone() - lit(1)), bound(year))
    };
    some(when(before_year_end).then(this_year).otherwise(other_year))
}

fn date_diff(a: &Args) -> Out {
    let start = a.datetime(0)?;
    let finish = a.datetime(1)?;
    let interval = a.keyword(2)?;
    let delta = finish.clone() - start.clone();
    let months = || {
        let years = finish.clone().dt().year() - start.clone().dt().year();
        let months = finish.clone().dt().month().cast(DataType::Int32)
            - start.clone().dt().month().cast(DataType::Int32);
        years * lit(12) + months
    };
    let expr = match interval.as_str() {
        "SECOND" => delta.dt().total_seconds().cast(DataType::Int64),
        "MINUTE" => delta.dt().total_minutes().cast(DataType::Int64),
        "HOUR" => delta.dt().total_hours().cast(DataType::Int64),
        "DAY" => delta.dt().total_days(),
        "WEEK" => delta.dt().total_days().floor_div(lit(7)),
        "MONTH" => months(),
        "QUARTER" => months().floor_div(lit(3)),
        "YEAR" => finish.clone().dt().year() - start.clone().dt().year(),
        _ => return Err(FormulaError::ArgumentType(3, a.signature)),
    };
    some(expr)
}

#[cfg(test)]
mod tests {
    use crate::formula::{Formula, FormulaError};
    use chrono::NaiveDate;
    use polars::prelude::*;

    fn sales() -> DataFrame {
        df!(
            "Region" => ["X", "A", "A", "B", "B", "C", "C", "C", "D", "E"],
            "City" => [Some("A"), Some("B"), Some("C"), Some("D"), Some("E"), Some("F"), Some("G"), Some("H"), Some("I"), None],
            "Sales" => [1i64, 2, 3, 4, 5, 6, 7, 8, 9, 10],
            "Promotions" => [Some("5"), Some("10"), Some("6"), Some("9"), Some("7"), Some(""), Some("8"), None, Some("8.5"), Some("true")],
        )
        .unwrap()
    }

    fn measure(df: &DataFrame, formula: &str) -> AnyValue<'static> {
        let formula = Formula::parse(formula, ',').unwrap();
        let out = formula.evaluate(df).unwrap();
        out.column(formula.output_name())
            .unwrap()
            .get(0)
            .unwrap()
            .into_static()
    }

    fn number(formula: &str) -> f64 {
        measure(&sales(), formula).extract::<f64>().unwrap()
    }

    fn date(formula: &str) -> NaiveDate {
        match measure(&sales(), formula) {
            AnyValue::Date(days) => {
                NaiveDate::from_ymd_opt(1970, 1, 1).unwrap() + chrono::Days::new(days as u64)
            }
            other => panic!("not a date: {other:?}"),
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn error(formula: &str) -> FormulaError {
        Formula::parse(formula, ',').unwrap_err()
    }

    #[test]
    fn test_aggregations() {
        assert_eq!(number("x = AVERAGE([Sales])"), 5.5);
        assert_eq!(number("x = AVERAGEA([Promotions])"), 6.8125);
        assert_eq!(number("x = COUNT([City])"), 9.0);
        assert_eq!(number("x = COUNTA([Promotions])"), 8.0);
        assert_eq!(number("x = COUNTBLANK([City])"), 1.0);
        assert_eq!(number("x = COUNTROWS()"), 10.0);
        assert_eq!(number("x = DISTINCTCOUNT([Region])"), 6.0);
        assert_eq!(number("x = DISTINCTCOUNTNOBLANK([City])"), 9.0);
        assert_eq!(number("x = SUM([Sales])"), 55.0);
        assert_eq!(number("x = PRODUCT([Sales])"), 3_628_800.0);
        assert_eq!(number("x = MAX([Sales])"), 10.0);
        assert_eq!(number("x = MAXA([Promotions])"), 10.0);
        assert_eq!(number("x = MINA([Promotions])"), 1.0);
    }

    #[test]
    fn test_text_argument_names_a_column() {
        assert_eq!(number("x = SUM('Sales')"), 55.0);
    }

    #[test]
    fn test_month_arithmetic_clamps_to_month_end() {
        assert_eq!(date("x = EDATE('2025-10-31', 4)"), ymd(2026, 2, 28));
        assert_eq!(date("x = EOMONTH('2025-10-19', 4)"), ymd(2026, 2, 28));
        assert_eq!(date("x = DATEADD('2025-11-01', 1, DAY)"), ymd(2025, 11, 2));
        assert_eq!(date("x = DATEADD('2025-11-01', -1, YEAR)"), ymd(2024, 11, 1));
    }

    #[test]
    fn test_period_bounds() {
        assert_eq!(date("x = ENDOFMONTH('2025-11-02')"), ymd(2025, 11, 30));
        assert_eq!(date("x = STARTOFMONTH('2025-11-12')"), ymd(2025, 11, 1));
        assert_eq!(date("x = ENDOFQUARTER('2025-11-03')"), ymd(2025, 12, 31));
        assert_eq!(date("x = STARTOFQUARTER('2025-05-03')"), ymd(2025, 4, 1));
        assert_eq!(date("x = ENDOFYEAR('2025-11-04')"), ymd(2025, 12, 31));
        assert_eq!(date("x = ENDOFYEAR('2025-11-04', '2025-06-30')"), ymd(2026, 6, 30));
        assert_eq!(date("x = ENDOFYEAR('2025-01-04', '2025-06-30')"), ymd(2025, 6, 30));
        assert_eq!(date("x = STARTOFYEAR('2025-11-04')"), ymd(2025, 1, 1));
        assert_eq!(date("x = STARTOFYEAR('2025-11-04', '2025-06-30')"), ymd(2025, 7, 1));
        assert_eq!(date("x = FIRSTDATE('2025-01-05')"), ymd(2025, 1, 5));
    }

    #[test]
    fn test_date_parts() {
        assert_eq!(number("x = QUARTER('2025-10-23')"), 4.0);
        assert_eq!(number("x = YEAR('2025-10-23')"), 2025.0);
        assert_eq!(number("x = HOUR('08:30 PM')"), 20.0);
        assert_eq!(number("x = WEEKDAY('2025-10-25')"), 7.0);
        assert_eq!(number("x = WEEKDAY('2025-10-25', 2)"), 6.0);
        assert_eq!(number("x = WEEKDAY('2025-10-25', 3)"), 5.0);
        assert_eq!(number("x = WEEKDAY('2025-10-26', 9)"), 6.0);
    }

    #[test]
    fn test_date_diff() {
        assert_eq!(number("x = DATEDIFF('2025-10-13', '2025-10-14', DAY)"), 1.0);
        assert_eq!(number("x = DATEDIFF('2025-10-14', '2025-10-13', DAY)"), -1.0);
        assert_eq!(number("x = DATEDIFF('2025-10-13', '2025-10-14', MINUTE)"), 1440.0);
        assert_eq!(number("x = DATEDIFF('2025-10-13', '2026-10-14', MONTH)"), 12.0);
        assert_eq!(number("x = DATEDIFF('2025-10-13', '2026-10-14', QUARTER)"), 4.0);
        assert_eq!(number("x = DATEDIFF('2025-10-13', '2026-10-14', WEEK)"), 52.0);
        assert_eq!(
            error("x = DATEDIFF('2025-10-13', '2025-10-14', 'MILLISECOND')"),
            FormulaError::ArgumentType(3, "DATEDIFF(date1, date2, interval)")
        );
    }

    #[test]
    fn test_logical_and_bitwise() {
        assert_eq!(number("x = BITAND(1, 3)"), 1.0);
        assert_eq!(number("x = BITOR(1, 2)"), 3.0);
        assert_eq!(number("x = BITXOR(1, 3)"), 2.0);
        assert_eq!(number("x = NOT(5)"), -6.0);
        assert_eq!(measure(&sales(), "x = AND(TRUE(), FALSE())"), AnyValue::Boolean(false));
    }

    #[test]
    fn test_math() {
        assert!(measure(&sales(), "x = DIVIDE(0, 0)").is_null());
        assert_eq!(number("x = DIVIDE(0, 0, -1)"), -1.0);
        assert_eq!(number("x = DIVIDE(17, 0)"), f64::INFINITY);
        assert_eq!(number("x = EVEN(99)"), 100.0);
        assert_eq!(number("x = EVEN(-1.5)"), -2.0);
        assert_eq!(number("x = ODD(98)"), 99.0);
        assert_eq!(number("x = POWER(2, 10)"), 1024.0);
        assert!((number("x = LOG(8, 2)") - 3.0).abs() < 1e-12);
        assert!((number("x = SQRTPI(1)") - std::f64::consts::PI.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_text() {
        assert_eq!(number("x = LEN('Some text')"), 9.0);
        assert_eq!(number("x = VALUE('17.99')"), 17.99);
        assert_eq!(
            measure(&sales(), "x = UPPER([Region])"),
            AnyValue::StringOwned("X".into())
        );
    }

    #[test]
    fn test_argument_count_and_unsupported() {
        assert_eq!(error("x = SUM()"), FormulaError::ArgumentCount("SUM(column)"));
        assert_eq!(
            error("x = CALCULATE([Sales])"),
            FormulaError::Unsupported("CALCULATE".into())
        );
        assert_eq!(error("x = sumx([Sales])"), FormulaError::Unsupported("SUMX".into()));
    }
}
