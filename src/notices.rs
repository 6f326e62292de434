use crate::error::RemoteError;
use crate::model::{Notice, User};
use crate::store::{RequestStore, RotaReader};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeRef {
    pub id: String,
    pub version: i64,
}

/// Unread and blocking notices for one actor.
#[derive(Debug, Clone, Default)]
pub struct NoticeGate {
    visible: Vec<Notice>,
    unread: Vec<NoticeRef>,
    blocking: Vec<NoticeRef>,
}

fn dedupe_newest(rows: Vec<Notice>) -> Vec<Notice> {
    let mut by_id: HashMap<String, Notice> = HashMap::new();
    for n in rows {
        match by_id.get(&n.id) {
            Some(prev) if prev.updated_at >= n.updated_at => {}
            _ => {
                by_id.insert(n.id.clone(), n);
            }
        }
    }
    let mut out: Vec<Notice> = by_id.into_values().collect();
    out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
    out
}

impl NoticeGate {
    pub fn compute(actor: &User, rows: Vec<Notice>) -> Self {
        let visible: Vec<Notice> = dedupe_newest(rows)
            .into_iter()
            .filter(|n| n.targets(actor))
            .collect();

        let mut unread = Vec::new();
        let mut blocking = Vec::new();
        for n in visible.iter().filter(|n| n.is_active) {
            if n.is_acknowledged() {
                continue;
            }
            let r = NoticeRef {
                id: n.id.clone(),
                version: n.version,
            };
            if n.mandatory {
                blocking.push(r.clone());
            }
            unread.push(r);
        }

        Self {
            visible,
            unread,
            blocking,
        }
    }

    pub fn refresh<R>(&mut self, reader: &R, actor: &User) -> Result<(), RemoteError>
    where
        R: RotaReader + ?Sized,
    {
        let rows = reader.notices_for_user(&actor.id)?;
        *self = NoticeGate::compute(actor, rows);
        Ok(())
    }

    /// Acknowledges on the store, then re-reads the notice list instead of
    /// patching local state; an admin may have changed notices meanwhile.
    pub fn acknowledge<S>(
        &mut self,
        store: &mut S,
        actor: &User,
        notice_id: &str,
        version: i64,
    ) -> Result<(), RemoteError>
    where
        S: RequestStore + RotaReader + ?Sized,
    {
        store.acknowledge_notice(&actor.id, notice_id, version)?;
        if let Err(e) = self.refresh(store, actor) {
            tracing::warn!(notice_id, error = %e, "notice refresh after acknowledge failed");
        }
        Ok(())
    }

    pub fn is_blocking(&self) -> bool {
        !self.blocking.is_empty()
    }

    pub fn visible(&self) -> &[Notice] {
        &self.visible
    }

    pub fn unread(&self) -> &[NoticeRef] {
        &self.unread
    }

    pub fn blocking(&self) -> &[NoticeRef] {
        &self.blocking
    }
}
