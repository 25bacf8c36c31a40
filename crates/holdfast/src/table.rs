//! Semantic column lookup for data tables.
//!
//! Column positions move between releases (a new "Region" column pushes
//! "Status" one to the right), so cells are located by header text rather
//! than by a hard-coded index: find the header whose trimmed text equals the
//! column name (ignoring case), then read the Nth cell of every row.

use tracing::debug;

use crate::driver::{PageDriver, Scope};
use crate::locator::Selector;
use crate::result::{HoldfastError, HoldfastResult};

/// Describes where a table's header cells and rows live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLocator {
    name: String,
    root: String,
    header_cells: String,
    rows: String,
}

impl TableLocator {
    /// HTML table rooted at `root` (`thead th` headers, `tbody tr` rows)
    #[must_use]
    pub fn new(name: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            header_cells: "thead th".to_string(),
            rows: "tbody tr".to_string(),
        }
    }

    /// Angular Material table (`mat-header-cell` headers, `mat-row` rows)
    #[must_use]
    pub fn material(name: impl Into<String>, root: impl Into<String>) -> Self {
        Self::new(name, root)
            .with_header_cells("mat-header-row mat-header-cell")
            .with_rows("mat-row")
    }

    /// Override the header cell selector (relative to the root)
    #[must_use]
    pub fn with_header_cells(mut self, css: impl Into<String>) -> Self {
        self.header_cells = css.into();
        self
    }

    /// Override the row selector (relative to the root)
    #[must_use]
    pub fn with_rows(mut self, css: impl Into<String>) -> Self {
        self.rows = css.into();
        self
    }

    /// Table name used in errors
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Selector for every header cell
    #[must_use]
    pub fn header_selector(&self) -> Selector {
        Selector::css(format!("{} {}", self.root, self.header_cells))
    }

    /// Selector for every body row
    #[must_use]
    pub fn row_selector(&self) -> Selector {
        Selector::css(format!("{} {}", self.root, self.rows))
    }

    /// Selector for the `index`-th (1-based) cell of every row
    #[must_use]
    pub fn cell_selector(&self, index: usize) -> Selector {
        Selector::css(format!("{} {} > :nth-child({index})", self.root, self.rows))
    }

    /// 1-based index of the column headed `header`, if any
    ///
    /// # Errors
    ///
    /// Returns error if the driver fails while reading header cells
    pub async fn column_index(&self, driver: &dyn PageDriver, header: &str) -> HoldfastResult<Option<usize>> {
        let wanted = header.trim().to_lowercase();
        let cells = driver.query(&Scope::Document, &self.header_selector()).await?;
        for (i, cell) in cells.iter().enumerate() {
            let text = driver.text(cell).await?;
            if text.trim().to_lowercase() == wanted {
                debug!(table = %self.name, header, index = i + 1, "column located");
                return Ok(Some(i + 1));
            }
        }
        Ok(None)
    }

    /// Trimmed text of the `header` column in every row, in document order
    ///
    /// # Errors
    ///
    /// Returns [`HoldfastError::NotFound`] if no header matches, or a driver
    /// error while reading cells
    pub async fn column_values(&self, driver: &dyn PageDriver, header: &str) -> HoldfastResult<Vec<String>> {
        let index = self
            .column_index(driver, header)
            .await?
            .ok_or_else(|| HoldfastError::NotFound {
                target: format!("{} column {header:?}", self.name),
                candidates_tried: 1,
                elapsed_ms: 0,
            })?;
        let cells = driver.query(&Scope::Document, &self.cell_selector(index)).await?;
        let mut values = Vec::with_capacity(cells.len());
        for cell in &cells {
            values.push(driver.text(cell).await?.trim().to_string());
        }
        Ok(values)
    }

    /// Number of body rows currently rendered
    ///
    /// # Errors
    ///
    /// Returns error if the query fails
    pub async fn row_count(&self, driver: &dyn PageDriver) -> HoldfastResult<usize> {
        Ok(driver.query(&Scope::Document, &self.row_selector()).await?.len())
    }
}
