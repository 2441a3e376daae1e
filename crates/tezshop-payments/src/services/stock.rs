//! Conditional stock and debt mutations.
//!
//! Reservation is lock-free: a single conditional `UPDATE` either hits the
//! row (stock was sufficient) or hits nothing. Restores are plain additive
//! updates against the same rows, so inventory is conserved across any
//! interleaving of reservations and compensating cancels.

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter};

use crate::entities::{product, user};

/// `UPDATE products SET stock = stock - qty WHERE id = ? AND stock >= qty`.
/// Returns whether the reservation hit the row.
pub async fn reserve<C: ConnectionTrait>(
    conn: &C,
    product_id: i64,
    quantity: i32,
) -> Result<bool, DbErr> {
    let result = product::Entity::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).sub(quantity),
        )
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::Stock.gte(quantity))
        .exec(conn)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Returns reserved stock to a product. A missing product (hard-deleted
/// after the order) makes this a no-op.
pub async fn restore<C: ConnectionTrait>(
    conn: &C,
    product_id: i64,
    quantity: i32,
) -> Result<(), DbErr> {
    product::Entity::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).add(quantity),
        )
        .filter(product::Column::Id.eq(product_id))
        .exec(conn)
        .await?;
    Ok(())
}

/// Re-adds a reversed repayment to the user's debt.
pub async fn restore_debt<C: ConnectionTrait>(
    conn: &C,
    user_id: i64,
    amount: i64,
) -> Result<(), DbErr> {
    user::Entity::update_many()
        .col_expr(user::Column::Debt, Expr::col(user::Column::Debt).add(amount))
        .filter(user::Column::Id.eq(user_id))
        .exec(conn)
        .await?;
    Ok(())
}
