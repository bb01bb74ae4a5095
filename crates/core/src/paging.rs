//! Paged search results.

use crate::context::RequestContext;

/// What a list or search operation found.
#[derive(Clone, Debug)]
pub enum PageableResult<T> {
    /// Nothing matched, or the search scope could not be resolved.
    Empty,
    /// Every match; the page is sliced out here.
    NeedsPaging(Vec<T>),
    /// The service already applied `startIndex`/`limit`.
    AlreadyPaged {
        results: Vec<T>,
        has_more: bool,
        total: Option<usize>,
    },
}

/// One page of results.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub has_more: bool,
    pub total: Option<usize>,
}

impl<T> PageableResult<T> {
    /// Applies the request's `startIndex` and `limit`.
    pub fn into_page(self, ctx: &RequestContext) -> Page<T> {
        self.paginate(ctx.params().start_index, ctx.limit())
    }

    pub fn paginate(self, start_index: usize, limit: usize) -> Page<T> {
        match self {
            PageableResult::Empty => Page {
                results: Vec::new(),
                has_more: false,
                total: Some(0),
            },
            PageableResult::NeedsPaging(all) => {
                let total = all.len();
                let results: Vec<T> = all.into_iter().skip(start_index).take(limit).collect();
                Page {
                    has_more: start_index.saturating_add(results.len()) < total,
                    results,
                    total: Some(total),
                }
            }
            PageableResult::AlreadyPaged {
                results,
                has_more,
                total,
            } => Page {
                results,
                has_more,
                total,
            },
        }
    }
}

impl<T> From<Vec<T>> for PageableResult<T> {
    fn from(results: Vec<T>) -> Self {
        PageableResult::NeedsPaging(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_paging_slices() {
        let page = PageableResult::NeedsPaging((0..7).collect::<Vec<_>>()).paginate(2, 3);

        assert_eq!(page.results, [2, 3, 4]);
        assert!(page.has_more);
        assert_eq!(page.total, Some(7));
    }

    #[test]
    fn test_last_page_has_no_more() {
        let page = PageableResult::NeedsPaging((0..7).collect::<Vec<_>>()).paginate(6, 3);

        assert_eq!(page.results, [6]);
        assert!(!page.has_more);
    }

    #[test]
    fn test_start_past_end_is_empty() {
        let page = PageableResult::NeedsPaging(vec![1, 2]).paginate(10, 3);

        assert!(page.results.is_empty());
        assert!(!page.has_more);
    }

    #[test]
    fn test_empty_and_already_paged() {
        let empty: Page<u8> = PageableResult::Empty.paginate(0, 10);
        assert_eq!(empty.total, Some(0));

        let paged = PageableResult::AlreadyPaged {
            results: vec![1u8],
            has_more: true,
            total: None,
        }
        .paginate(50, 1);
        assert_eq!(paged.results, [1]);
        assert!(paged.has_more);
    }
}
