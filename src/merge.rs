//! Type merger: unifies two observed types into the widened type that can
//! hold both.
//!
//! Objects merge field-wise and arrays merge element-wise. Any other shape
//! mismatch collides into a flat [`UnionSet`]. `Primitive(Null)` is the
//! identity element, so placeholders left by empty arrays or null values
//! take the shape of the first real observation.

use crate::schema::{SchemaType, UnionSet};

pub fn merge(left: &SchemaType, right: &SchemaType) -> SchemaType {
    match (left, right) {
        (SchemaType::Primitive(_), _) if left.is_null() => right.clone(),
        (_, SchemaType::Primitive(_)) if right.is_null() => left.clone(),
        (SchemaType::Union(set), other) => {
            let mut merged = set.clone();
            absorb_all(&mut merged, other);
            SchemaType::Union(merged)
        }
        (other, SchemaType::Union(set)) => {
            // Left operand keeps first place so the bare field name stays with
            // the type that was observed first.
            set.iter()
                .fold(other.clone(), |accumulated, member| merge(&accumulated, member))
        }
        (SchemaType::Object(left_fields), SchemaType::Object(right_fields)) => {
            let mut fields = left_fields.clone();
            for (name, ty) in right_fields {
                let merged = match fields.get(name) {
                    Some(existing) => merge(existing, ty),
                    None => ty.clone(),
                };
                fields.insert(name.clone(), merged);
            }
            SchemaType::Object(fields)
        }
        (SchemaType::Array(left_element), SchemaType::Array(right_element)) => {
            SchemaType::array(merge(left_element, right_element))
        }
        _ if left == right => left.clone(),
        _ => SchemaType::Union(UnionSet::pair(left.clone(), right.clone())),
    }
}

fn absorb_all(set: &mut UnionSet, other: &SchemaType) {
    match other {
        SchemaType::Union(members) => {
            for member in members {
                set.absorb(member);
            }
        }
        single => set.absorb(single),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaf_strategy() -> impl Strategy<Value = SchemaType> {
        prop_oneof![
            Just(SchemaType::INTEGER),
            Just(SchemaType::FLOAT),
            Just(SchemaType::BOOLEAN),
            Just(SchemaType::TEXT),
            Just(SchemaType::TIMESTAMPTZ),
            Just(SchemaType::NULL),
            (1u32..=3).prop_map(SchemaType::FixedBits),
        ]
    }

    fn type_strategy() -> impl Strategy<Value = SchemaType> {
        leaf_strategy().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                inner.clone().prop_map(SchemaType::array),
                proptest::collection::btree_map("[a-c]", inner.clone(), 0..3)
                    .prop_map(SchemaType::Object),
                proptest::collection::vec(inner, 2..4)
                    .prop_map(|members| SchemaType::union_of(members)),
            ]
        })
    }

    #[test]
    fn objects_merge_field_wise() {
        let left = SchemaType::object([("a", SchemaType::INTEGER), ("b", SchemaType::TEXT)]);
        let right = SchemaType::object([("b", SchemaType::TEXT), ("c", SchemaType::BOOLEAN)]);
        assert_eq!(
            merge(&left, &right),
            SchemaType::object([
                ("a", SchemaType::INTEGER),
                ("b", SchemaType::TEXT),
                ("c", SchemaType::BOOLEAN),
            ])
        );
    }

    #[test]
    fn arrays_merge_element_wise() {
        let merged = merge(
            &SchemaType::array(SchemaType::INTEGER),
            &SchemaType::array(SchemaType::TEXT),
        );
        let SchemaType::Array(element) = &merged else {
            panic!("expected array, got {merged}");
        };
        assert!(matches!(element.as_ref(), SchemaType::Union(set) if set.len() == 2));
    }

    #[test]
    fn empty_array_placeholder_takes_first_real_shape() {
        let merged = merge(
            &SchemaType::array(SchemaType::NULL),
            &SchemaType::array(SchemaType::BOOLEAN),
        );
        assert_eq!(merged, SchemaType::array(SchemaType::BOOLEAN));
    }

    #[test]
    fn mismatched_shapes_collide() {
        let merged = merge(&SchemaType::empty_object(), &SchemaType::INTEGER);
        let SchemaType::Union(set) = &merged else {
            panic!("expected union, got {merged}");
        };
        assert_eq!(set.first(), &SchemaType::empty_object());
        assert!(set.contains(&SchemaType::INTEGER));
    }

    #[test]
    fn fixed_bits_of_different_sizes_collide() {
        let merged = merge(&SchemaType::FixedBits(4), &SchemaType::FixedBits(8));
        assert!(matches!(merged, SchemaType::Union(ref set) if set.len() == 2));
        assert_eq!(
            merge(&SchemaType::FixedBits(4), &SchemaType::FixedBits(4)),
            SchemaType::FixedBits(4)
        );
    }

    #[test]
    fn unions_stay_flat_and_unify_same_kind_members() {
        let first = merge(
            &SchemaType::object([("a", SchemaType::INTEGER)]),
            &SchemaType::TEXT,
        );
        let second = merge(
            &SchemaType::BOOLEAN,
            &SchemaType::object([("b", SchemaType::TEXT)]),
        );
        let merged = merge(&first, &second);
        let SchemaType::Union(set) = &merged else {
            panic!("expected union, got {merged}");
        };
        assert_eq!(set.len(), 3);
        assert!(set.iter().all(|member| !matches!(member, SchemaType::Union(_))));
        assert_eq!(
            set.first(),
            &SchemaType::object([("a", SchemaType::INTEGER), ("b", SchemaType::TEXT)])
        );
    }

    #[test]
    fn merging_into_a_union_keeps_left_operand_first() {
        let union = merge(&SchemaType::TEXT, &SchemaType::BOOLEAN);
        let merged = merge(&SchemaType::INTEGER, &union);
        assert_eq!(merged.physical_view(), &SchemaType::INTEGER);
    }

    proptest! {
        #[test]
        fn merge_is_idempotent(a in type_strategy()) {
            prop_assert_eq!(merge(&a, &a), a);
        }

        #[test]
        fn merge_is_commutative(a in type_strategy(), b in type_strategy()) {
            prop_assert_eq!(merge(&a, &b), merge(&b, &a));
        }

        #[test]
        fn merge_is_associative(
            a in type_strategy(),
            b in type_strategy(),
            c in type_strategy(),
        ) {
            prop_assert_eq!(
                merge(&merge(&a, &b), &c),
                merge(&a, &merge(&b, &c))
            );
        }

        #[test]
        fn merge_never_drops_a_learned_branch(a in type_strategy(), b in type_strategy()) {
            let merged = merge(&a, &b);
            prop_assert_eq!(merge(&merged, &a), merged.clone());
            prop_assert_eq!(merge(&merged, &b), merged);
        }
    }
}
