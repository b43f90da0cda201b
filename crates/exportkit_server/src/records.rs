//! Exported record types, their column declarations and their data sources.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use exportkit_xlsx::{
    EnumCellKind, EnumCellValue, EnumFieldRef, RecordFields, SpecFieldDecl, SpecRecordType,
    TabularRecord,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_postgres::Row;

/// Record type that can be loaded from Postgres and, optionally, from the
/// upstream record API.
pub trait SourcedRecord: TabularRecord + DeserializeOwned + Clone + 'static {
    /// Query returning every record, one row per record.
    const C_SQL_SELECT: &'static str;
    /// Query returning the records of one employee bound as `$1`; `None` when
    /// the type has no employee relation.
    const C_SQL_SELECT_BY_EMPLOYEE: Option<&'static str>;
    /// Path below the upstream API base URL; `None` when only stored locally.
    const C_UPSTREAM_PATH: Option<&'static str> = None;

    /// Decode one row produced by either query.
    fn from_pg_row(row: &Row) -> Result<Self, tokio_postgres::Error>;
}

////////////////////////////////////////////////////////////////////////////////
// #region Salary

/// Salary period of one employee.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Salary {
    pub employee_id: i64,
    pub amount: f64,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
}

pub static SALARY_TYPE: SpecRecordType = SpecRecordType {
    name: "Salary",
    fields: &[
        SpecFieldDecl::scalar("employee_id", "Employee ID", EnumCellKind::Integer),
        SpecFieldDecl::scalar("amount", "Amount", EnumCellKind::Float),
        SpecFieldDecl::scalar("from_date", "From Date", EnumCellKind::DateTime),
        SpecFieldDecl::scalar("to_date", "To Date", EnumCellKind::DateTime),
    ],
};

fn salary_type() -> &'static SpecRecordType {
    &SALARY_TYPE
}

impl RecordFields for Salary {
    fn field(&self, ident: &str) -> Option<EnumFieldRef<'_>> {
        let value: EnumCellValue = match ident {
            "employee_id" => self.employee_id.into(),
            "amount" => self.amount.into(),
            "from_date" => self.from_date.into(),
            "to_date" => self.to_date.into(),
            _ => return None,
        };
        Some(EnumFieldRef::Cell(value))
    }
}

impl TabularRecord for Salary {
    fn record_type() -> &'static SpecRecordType {
        salary_type()
    }
}

impl SourcedRecord for Salary {
    const C_SQL_SELECT: &'static str = "SELECT employee_id::int8 AS employee_id, \
         amount::float8 AS amount, from_date::date AS from_date, to_date::date AS to_date \
         FROM salary ORDER BY employee_id, from_date";
    const C_SQL_SELECT_BY_EMPLOYEE: Option<&'static str> = Some(
        "SELECT employee_id::int8 AS employee_id, \
         amount::float8 AS amount, from_date::date AS from_date, to_date::date AS to_date \
         FROM salary WHERE employee_id = $1 ORDER BY from_date",
    );

    fn from_pg_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            employee_id: row.try_get("employee_id")?,
            amount: row.try_get("amount")?,
            from_date: row.try_get("from_date")?,
            to_date: row.try_get("to_date")?,
        })
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Title

/// Job title held by one employee over a period.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Title {
    pub employee_id: i64,
    pub title: String,
    pub from_date: NaiveDate,
    pub to_date: Option<NaiveDate>,
}

pub static TITLE_TYPE: SpecRecordType = SpecRecordType {
    name: "Title",
    fields: &[
        SpecFieldDecl::scalar("employee_id", "Employee ID", EnumCellKind::Integer),
        SpecFieldDecl::scalar("title", "Title", EnumCellKind::Text),
        SpecFieldDecl::scalar("from_date", "From Date", EnumCellKind::DateTime),
        SpecFieldDecl::scalar("to_date", "To Date", EnumCellKind::DateTime),
    ],
};

fn title_type() -> &'static SpecRecordType {
    &TITLE_TYPE
}

impl RecordFields for Title {
    fn field(&self, ident: &str) -> Option<EnumFieldRef<'_>> {
        let value: EnumCellValue = match ident {
            "employee_id" => self.employee_id.into(),
            "title" => (&self.title).into(),
            "from_date" => self.from_date.into(),
            "to_date" => self.to_date.into(),
            _ => return None,
        };
        Some(EnumFieldRef::Cell(value))
    }
}

impl TabularRecord for Title {
    fn record_type() -> &'static SpecRecordType {
        title_type()
    }
}

impl SourcedRecord for Title {
    const C_SQL_SELECT: &'static str = "SELECT employee_id::int8 AS employee_id, title, \
         from_date::date AS from_date, to_date::date AS to_date \
         FROM title ORDER BY employee_id, from_date";
    const C_SQL_SELECT_BY_EMPLOYEE: Option<&'static str> = Some(
        "SELECT employee_id::int8 AS employee_id, title, \
         from_date::date AS from_date, to_date::date AS to_date \
         FROM title WHERE employee_id = $1 ORDER BY from_date",
    );

    fn from_pg_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            employee_id: row.try_get("employee_id")?,
            title: row.try_get("title")?,
            from_date: row.try_get("from_date")?,
            to_date: row.try_get("to_date")?,
        })
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Employee

/// Employee master data.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub birth_date: NaiveDate,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub hire_date: NaiveDate,
}

pub static EMPLOYEE_TYPE: SpecRecordType = SpecRecordType {
    name: "Employee",
    fields: &[
        SpecFieldDecl::scalar("id", "ID", EnumCellKind::Integer),
        SpecFieldDecl::scalar("birth_date", "Birth Date", EnumCellKind::DateTime),
        SpecFieldDecl::scalar("first_name", "First Name", EnumCellKind::Text),
        SpecFieldDecl::scalar("last_name", "Last Name", EnumCellKind::Text),
        SpecFieldDecl::scalar("gender", "Gender", EnumCellKind::Text),
        SpecFieldDecl::scalar("hire_date", "Hire Date", EnumCellKind::DateTime),
    ],
};

fn employee_type() -> &'static SpecRecordType {
    &EMPLOYEE_TYPE
}

impl RecordFields for Employee {
    fn field(&self, ident: &str) -> Option<EnumFieldRef<'_>> {
        let value: EnumCellValue = match ident {
            "id" => self.id.into(),
            "birth_date" => self.birth_date.into(),
            "first_name" => (&self.first_name).into(),
            "last_name" => (&self.last_name).into(),
            "gender" => (&self.gender).into(),
            "hire_date" => self.hire_date.into(),
            _ => return None,
        };
        Some(EnumFieldRef::Cell(value))
    }
}

impl TabularRecord for Employee {
    fn record_type() -> &'static SpecRecordType {
        employee_type()
    }
}

impl SourcedRecord for Employee {
    const C_SQL_SELECT: &'static str = "SELECT id::int8 AS id, birth_date::date AS birth_date, \
         first_name, last_name, gender::text AS gender, hire_date::date AS hire_date \
         FROM employee ORDER BY id";
    const C_SQL_SELECT_BY_EMPLOYEE: Option<&'static str> = Some(
        "SELECT id::int8 AS id, birth_date::date AS birth_date, \
         first_name, last_name, gender::text AS gender, hire_date::date AS hire_date \
         FROM employee WHERE id = $1",
    );

    fn from_pg_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            birth_date: row.try_get("birth_date")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            gender: row.try_get("gender")?,
            hire_date: row.try_get("hire_date")?,
        })
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region EmployeeSalary

/// One salary period of an employee paired with the title held during it.
///
/// Flattens to the employee, salary and title columns in that order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmployeeSalary {
    pub employee: Employee,
    pub salary: Salary,
    pub title: Title,
}

pub static EMPLOYEE_SALARY_TYPE: SpecRecordType = SpecRecordType {
    name: "EmployeeSalary",
    fields: &[
        SpecFieldDecl::embedded("employee", employee_type),
        SpecFieldDecl::embedded("salary", salary_type),
        SpecFieldDecl::embedded("title", title_type),
    ],
};

impl RecordFields for EmployeeSalary {
    fn field(&self, ident: &str) -> Option<EnumFieldRef<'_>> {
        match ident {
            "employee" => Some(EnumFieldRef::Record(&self.employee)),
            "salary" => Some(EnumFieldRef::Record(&self.salary)),
            "title" => Some(EnumFieldRef::Record(&self.title)),
            _ => None,
        }
    }
}

impl TabularRecord for EmployeeSalary {
    fn record_type() -> &'static SpecRecordType {
        &EMPLOYEE_SALARY_TYPE
    }
}

macro_rules! sql_employee_salary {
    ($c_where:literal, $c_order:literal) => {
        concat!(
            "SELECT e.id::int8 AS id, e.birth_date::date AS birth_date, ",
            "e.first_name, e.last_name, e.gender::text AS gender, e.hire_date::date AS hire_date, ",
            "s.employee_id::int8 AS salary_employee_id, s.amount::float8 AS amount, ",
            "s.from_date::date AS salary_from_date, s.to_date::date AS salary_to_date, ",
            "t.employee_id::int8 AS title_employee_id, t.title, ",
            "t.from_date::date AS title_from_date, t.to_date::date AS title_to_date ",
            "FROM employee e ",
            "JOIN salary s ON s.employee_id = e.id ",
            "JOIN title t ON t.employee_id = e.id ",
            "AND t.from_date < s.to_date AND (t.to_date IS NULL OR s.from_date < t.to_date) ",
            $c_where,
            $c_order
        )
    };
}

impl SourcedRecord for EmployeeSalary {
    const C_SQL_SELECT: &'static str =
        sql_employee_salary!("", "ORDER BY e.id, s.from_date, t.from_date");
    const C_SQL_SELECT_BY_EMPLOYEE: Option<&'static str> = Some(sql_employee_salary!(
        "WHERE e.id = $1 ",
        "ORDER BY s.from_date, t.from_date"
    ));

    fn from_pg_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            employee: Employee::from_pg_row(row)?,
            salary: Salary {
                employee_id: row.try_get("salary_employee_id")?,
                amount: row.try_get("amount")?,
                from_date: row.try_get("salary_from_date")?,
                to_date: row.try_get("salary_to_date")?,
            },
            title: Title {
                employee_id: row.try_get("title_employee_id")?,
                title: row.try_get("title")?,
                from_date: row.try_get("title_from_date")?,
                to_date: row.try_get("title_to_date")?,
            },
        })
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region NetflixShow

/// Catalogue entry of the public Netflix titles dataset.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NetflixShow {
    pub show_id: String,
    #[serde(rename = "type")]
    pub show_type: Option<String>,
    pub title: Option<String>,
    pub director: Option<String>,
    pub cast_members: Option<String>,
    pub country: Option<String>,
    pub date_added: Option<NaiveDate>,
    pub release_year: Option<i32>,
    pub rating: Option<String>,
    pub duration: Option<String>,
    pub listed_in: Option<String>,
    pub description: Option<String>,
}

pub static NETFLIX_SHOW_TYPE: SpecRecordType = SpecRecordType {
    name: "NetflixShow",
    fields: &[
        SpecFieldDecl::scalar("show_id", "Id", EnumCellKind::Text),
        SpecFieldDecl::scalar("show_type", "Type", EnumCellKind::Text),
        SpecFieldDecl::scalar("title", "Title", EnumCellKind::Text),
        SpecFieldDecl::scalar("director", "Director", EnumCellKind::Text),
        SpecFieldDecl::scalar("cast_members", "Cast Members", EnumCellKind::Text),
        SpecFieldDecl::scalar("country", "Country", EnumCellKind::Text),
        SpecFieldDecl::scalar("date_added", "Date Added", EnumCellKind::DateTime),
        SpecFieldDecl::scalar("release_year", "Release Year", EnumCellKind::Integer),
        SpecFieldDecl::scalar("rating", "Rating", EnumCellKind::Text),
        SpecFieldDecl::scalar("duration", "Duration", EnumCellKind::Text),
        SpecFieldDecl::scalar("listed_in", "Listed In", EnumCellKind::Text),
        SpecFieldDecl::scalar("description", "Description", EnumCellKind::Text),
    ],
};

impl RecordFields for NetflixShow {
    fn field(&self, ident: &str) -> Option<EnumFieldRef<'_>> {
        let value: EnumCellValue = match ident {
            "show_id" => (&self.show_id).into(),
            "show_type" => self.show_type.as_ref().into(),
            "title" => self.title.as_ref().into(),
            "director" => self.director.as_ref().into(),
            "cast_members" => self.cast_members.as_ref().into(),
            "country" => self.country.as_ref().into(),
            "date_added" => self.date_added.into(),
            "release_year" => self.release_year.into(),
            "rating" => self.rating.as_ref().into(),
            "duration" => self.duration.as_ref().into(),
            "listed_in" => self.listed_in.as_ref().into(),
            "description" => self.description.as_ref().into(),
            _ => return None,
        };
        Some(EnumFieldRef::Cell(value))
    }
}

impl TabularRecord for NetflixShow {
    fn record_type() -> &'static SpecRecordType {
        &NETFLIX_SHOW_TYPE
    }
}

impl SourcedRecord for NetflixShow {
    const C_SQL_SELECT: &'static str = "SELECT show_id::text AS show_id, type AS show_type, \
         title, director, cast_members, country, date_added::date AS date_added, \
         release_year::int4 AS release_year, rating, duration, listed_in, description \
         FROM netflix_show ORDER BY show_id";
    const C_SQL_SELECT_BY_EMPLOYEE: Option<&'static str> = None;
    const C_UPSTREAM_PATH: Option<&'static str> = Some("netflix-shows");

    fn from_pg_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            show_id: row.try_get("show_id")?,
            show_type: row.try_get("show_type")?,
            title: row.try_get("title")?,
            director: row.try_get("director")?,
            cast_members: row.try_get("cast_members")?,
            country: row.try_get("country")?,
            date_added: row.try_get("date_added")?,
            release_year: row.try_get("release_year")?,
            rating: row.try_get("rating")?,
            duration: row.try_get("duration")?,
            listed_in: row.try_get("listed_in")?,
            description: row.try_get("description")?,
        })
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Dataset

/// How a dataset treats the `employee_id` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumEmployeeFilterRule {
    /// Filter may be given or omitted.
    Optional,
    /// Filter must be given.
    Required,
    /// Filter must be omitted.
    Unsupported,
}

/// Exportable dataset selectable through the `dataset` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumDataset {
    #[default]
    Salary,
    Title,
    Employee,
    EmployeeSalary,
    NetflixShow,
}

impl EnumDataset {
    /// Every dataset in declaration order.
    pub const ALL: [EnumDataset; 5] = [
        Self::Salary,
        Self::Title,
        Self::Employee,
        Self::EmployeeSalary,
        Self::NetflixShow,
    ];

    /// Query-parameter name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Salary => "salary",
            Self::Title => "title",
            Self::Employee => "employee",
            Self::EmployeeSalary => "employee_salary",
            Self::NetflixShow => "netflix_show",
        }
    }

    /// Attachment file name.
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Salary => "salaries.xlsx",
            Self::Title => "titles.xlsx",
            Self::Employee => "employees.xlsx",
            Self::EmployeeSalary => "employee_salaries.xlsx",
            Self::NetflixShow => "netflix_shows.xlsx",
        }
    }

    /// Worksheet name.
    pub fn sheet_name(self) -> &'static str {
        match self {
            Self::Salary => "Salaries",
            Self::Title => "Titles",
            Self::Employee => "Employees",
            Self::EmployeeSalary => "Employee Salaries",
            Self::NetflixShow => "Netflix Shows",
        }
    }

    /// Column declaration of the dataset's record type.
    pub fn record_type(self) -> &'static SpecRecordType {
        match self {
            Self::Salary => Salary::record_type(),
            Self::Title => Title::record_type(),
            Self::Employee => Employee::record_type(),
            Self::EmployeeSalary => EmployeeSalary::record_type(),
            Self::NetflixShow => NetflixShow::record_type(),
        }
    }

    /// Rule for the `employee_id` filter.
    pub fn rule_employee_filter(self) -> EnumEmployeeFilterRule {
        match self {
            Self::Salary | Self::Title | Self::Employee => EnumEmployeeFilterRule::Optional,
            Self::EmployeeSalary => EnumEmployeeFilterRule::Required,
            Self::NetflixShow => EnumEmployeeFilterRule::Unsupported,
        }
    }
}

impl fmt::Display for EnumDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EnumDataset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|dataset| dataset.name() == s.trim())
            .ok_or_else(|| {
                let l_names: Vec<&str> = Self::ALL.iter().map(|d| d.name()).collect();
                format!("unknown dataset `{s}`; expected one of {}", l_names.join(", "))
            })
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
