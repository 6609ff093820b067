//! Derives the logical edge between two users from both of their records, and
//! works out the writes that bring a disagreeing pair back in line.

use flick_common::non_api_structs::UserRecord;
use flick_common::UserId;

use crate::store::{apply_all, FieldUpdate, SetField};

#[derive(Eq, PartialEq, Clone, Debug)]
pub enum Phase {
    None,
    Pending { from: UserId, to: UserId },
    Friends,
}

/// Field updates for each side of a pair. `a` is the first user passed to
/// [`reconcile`], `b` the second.
#[derive(Eq, PartialEq, Clone, Debug, Default)]
pub struct Repair {
    pub a: Vec<FieldUpdate>,
    pub b: Vec<FieldUpdate>,
}

impl Repair {
    pub fn is_empty(&self) -> bool {
        self.a.is_empty() && self.b.is_empty()
    }

    pub fn apply(&self, a: &mut UserRecord, b: &mut UserRecord) {
        apply_all(a, &self.a);
        apply_all(b, &self.b);
    }
}

/// What a repair did to the friendship itself.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum FriendshipChange {
    Unchanged,
    /// The pair became friends on both sides.
    Completed,
    /// At least one side listed the other as a friend, and neither does now.
    Dropped,
}

#[derive(Eq, PartialEq, Clone, Debug)]
pub struct Reconciliation {
    /// Phase of the pair once `repair` has been applied.
    pub phase: Phase,
    pub repair: Repair,
    pub change: FriendshipChange,
}

/// One side's view of the other.
#[derive(Clone, Copy)]
struct View {
    friend: bool,
    outgoing: bool,
    incoming: bool,
}

impl View {
    fn of(record: &UserRecord, other: &UserId) -> Self {
        Self {
            friend: record.is_friend(other),
            outgoing: record.has_request_to(other),
            incoming: record.has_request_from(other),
        }
    }
}

pub fn reconcile(a_id: &UserId, a: &UserRecord, b_id: &UserId, b: &UserRecord) -> Reconciliation {
    let (phase, repair) = resolve(a_id, a, b_id, b);
    let was_friend = (a.is_friend(b_id), b.is_friend(a_id));
    let change = match (&phase, was_friend) {
        (Phase::Friends, (true, true)) => FriendshipChange::Unchanged,
        (Phase::Friends, _) => FriendshipChange::Completed,
        (_, (false, false)) => FriendshipChange::Unchanged,
        _ => FriendshipChange::Dropped,
    };
    Reconciliation { phase, repair, change }
}

fn resolve(a_id: &UserId, a: &UserRecord, b_id: &UserId, b: &UserRecord) -> (Phase, Repair) {
    use FieldUpdate::{SetRemove, SetUnion};
    use SetField::{Friends, IncomingRequests, OutgoingRequests};

    let mut av = View::of(a, b_id);
    let mut bv = View::of(b, a_id);
    let mut repair = Repair::default();

    // One-sided friendship: an accept whose second write was lost still has the
    // requester's outgoing entry. Anything else is a remove that stopped halfway.
    if av.friend != bv.friend {
        if av.friend && bv.outgoing {
            repair.b.push(SetUnion(Friends, a_id.clone()));
            repair.b.push(SetRemove(OutgoingRequests, a_id.clone()));
            bv.friend = true;
            bv.outgoing = false;
        } else if bv.friend && av.outgoing {
            repair.a.push(SetUnion(Friends, b_id.clone()));
            repair.a.push(SetRemove(OutgoingRequests, b_id.clone()));
            av.friend = true;
            av.outgoing = false;
        } else if av.friend {
            repair.a.push(SetRemove(Friends, b_id.clone()));
            av.friend = false;
        } else {
            repair.b.push(SetRemove(Friends, a_id.clone()));
            bv.friend = false;
        }
    }

    if av.friend && bv.friend {
        strip_pending(&mut repair.a, av, b_id);
        strip_pending(&mut repair.b, bv, a_id);
        return (Phase::Friends, repair);
    }

    let a_to_b = av.outgoing && bv.incoming;
    let b_to_a = bv.outgoing && av.incoming;
    if a_to_b && b_to_a {
        // Both sent before either saw the other's request.
        repair.a.push(SetUnion(Friends, b_id.clone()));
        strip_pending(&mut repair.a, av, b_id);
        repair.b.push(SetUnion(Friends, a_id.clone()));
        strip_pending(&mut repair.b, bv, a_id);
        return (Phase::Friends, repair);
    }

    if av.outgoing && !bv.incoming {
        repair.a.push(SetRemove(OutgoingRequests, b_id.clone()));
    }
    if bv.incoming && !av.outgoing {
        repair.b.push(SetRemove(IncomingRequests, a_id.clone()));
    }
    if bv.outgoing && !av.incoming {
        repair.b.push(SetRemove(OutgoingRequests, a_id.clone()));
    }
    if av.incoming && !bv.outgoing {
        repair.a.push(SetRemove(IncomingRequests, b_id.clone()));
    }

    let phase = if a_to_b {
        Phase::Pending { from: a_id.clone(), to: b_id.clone() }
    } else if b_to_a {
        Phase::Pending { from: b_id.clone(), to: a_id.clone() }
    } else {
        Phase::None
    };
    (phase, repair)
}

fn strip_pending(updates: &mut Vec<FieldUpdate>, view: View, other: &UserId) {
    if view.outgoing {
        updates.push(FieldUpdate::SetRemove(SetField::OutgoingRequests, other.clone()));
    }
    if view.incoming {
        updates.push(FieldUpdate::SetRemove(SetField::IncomingRequests, other.clone()));
    }
}
