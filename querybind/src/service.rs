//! List and count helpers over a [`QueryEngine`]
//!
//! Wraps compile, execute and row mapping into one call, the way list
//! endpoints use it:
//!
//! ```rust,ignore
//! let service = QueryService::new(engine, &config)?;
//! let mut page = Pagination::new(1, 20).order_by("name:ASC");
//! let employees: Vec<Employee> = service.list(&query, None, Some(&mut page)).await?;
//! println!("{} total", page.total_count.unwrap_or_default());
//! ```

use std::sync::Arc;

use crate::binder::FieldBinder;
use crate::config::Config;
use crate::engine::{QueryEngine, Row};
use crate::error::BindError;
use crate::meta::{Properties, QueryDto};
use crate::protect::ProtectFieldHandler;
use crate::query::compiler::{CompiledQuery, QueryCompiler};
use crate::query::pagination::Pagination;

pub struct QueryService<E: QueryEngine> {
    engine: E,
    compiler: QueryCompiler,
    default_page_size: u64,
    max_page_size: u64,
}

impl<E: QueryEngine> QueryService<E> {
    /// Fails when data protection is enabled with an unusable key.
    pub fn new(engine: E, config: &Config) -> anyhow::Result<Self> {
        let compiler = match config.protect_handler()? {
            Some(handler) => QueryCompiler::new().with_protector(handler),
            None => QueryCompiler::new(),
        };
        Ok(Self {
            engine,
            compiler,
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        })
    }

    pub fn with_protector(mut self, handler: Arc<dyn ProtectFieldHandler>) -> Self {
        self.compiler = self.compiler.with_protector(handler);
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn compiler(&self) -> &QueryCompiler {
        &self.compiler
    }

    pub fn binder(&self) -> FieldBinder<'_, E> {
        FieldBinder::new(&self.engine)
    }

    pub fn compile<D: QueryDto>(
        &self,
        dto: &D,
        fields: Option<&[&str]>,
        pagination: Option<&Pagination>,
    ) -> Result<CompiledQuery, BindError> {
        let clamped = pagination.map(|p| {
            let mut p = p.clone();
            if p.page_size == 0 {
                p.page_size = self.default_page_size;
            }
            p.clamped(self.max_page_size)
        });
        self.compiler.compile(dto, fields, clamped.as_ref())
    }

    /// Matching rows. With a pagination, `total_count` is filled first and
    /// only the requested page is returned.
    pub async fn list_rows<D: QueryDto>(
        &self,
        dto: &D,
        fields: Option<&[&str]>,
        pagination: Option<&mut Pagination>,
    ) -> Result<Vec<Row>, BindError> {
        let compiled = self.compile(dto, fields, pagination.as_deref())?;
        let select = compiled.to_select();

        if let Some(page) = pagination {
            let total = self.engine.count(&select.unpaged()).await?;
            page.total_count = Some(total);
            if let Some(clamped) = &compiled.pagination {
                page.page_size = clamped.page_size;
                page.page_index = clamped.page_index;
            }
        }

        Ok(self.engine.query(&select).await?)
    }

    /// Matching rows mapped onto `T`.
    pub async fn list<D: QueryDto, T: Properties + Default>(
        &self,
        dto: &D,
        fields: Option<&[&str]>,
        pagination: Option<&mut Pagination>,
    ) -> Result<Vec<T>, BindError> {
        let rows = self.list_rows(dto, fields, pagination).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let mut item = T::default();
                row.apply_to(&mut item);
                item
            })
            .collect())
    }

    pub async fn count<D: QueryDto>(
        &self,
        dto: &D,
        fields: Option<&[&str]>,
    ) -> Result<i64, BindError> {
        let compiled = self.compile(dto, fields, None)?;
        Ok(self.engine.count(&compiled.to_select()).await?)
    }
}
