use url::form_urlencoded;

/// Query string of the list endpoint. Malformed numbers fall back to
/// defaults instead of rejecting the request, and a repeated parameter keeps
/// its first value, matching how the response cache keys the same query.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TaskListQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl TaskListQuery {
    pub fn parse(raw: Option<&str>) -> Self {
        let mut query = Self::default();
        let Some(raw) = raw else {
            return query;
        };

        let mut page: Option<String> = None;
        let mut limit: Option<String> = None;
        for (name, value) in form_urlencoded::parse(raw.as_bytes()) {
            let slot = match name.as_ref() {
                "status" => &mut query.status,
                "page" => &mut page,
                "limit" => &mut limit,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        query.status = query.status.filter(|status| !status.is_empty());
        query.page = parse_number(page.as_deref());
        query.limit = parse_number(limit.as_deref());
        query
    }
}

fn parse_number(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|value| value.trim().parse().ok())
}
