// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Atelier

//! Response-message localization.
//!
//! The client picks a language with the `X-Lang` header (`pt`, `en`, `ru`);
//! anything else, including a missing header, falls back to Portuguese.
//! Only human-readable response strings are localized; field names, error
//! shapes and status codes never change with the language.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::convert::Infallible;

/// Supported response languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lang {
    #[default]
    Pt,
    En,
    Ru,
}

impl Lang {
    pub fn from_header(value: Option<&str>) -> Lang {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("en") => Lang::En,
            Some("ru") => Lang::Ru,
            _ => Lang::Pt,
        }
    }
}

impl<S> FromRequestParts<S> for Lang
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get("x-lang")
            .and_then(|value| value.to_str().ok());
        Ok(Lang::from_header(value))
    }
}

/// Every localized message the API can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Msg {
    ComponentUpdated,
    ComponentPublished,
    ComponentUnpublished,
    ComponentBought,
    ComponentSold,
    ComponentTrashed,
    ComponentRestored,
    ComponentPurged,
    TrashCleared,
    InsufficientArkhoins,
    ComponentNotFound,
    ComponentNotTrashed,
    ComponentAlreadyTrashed,
    ComponentNotPublic,
    ComponentAlreadyPublic,
    ComponentNotOwned,
    ComponentAlreadyOwned,
    ComponentOwnerCannotBuy,
    ComponentOwnerCannotSell,
    InvalidSearchPattern,
    InvalidCredentials,
    InvalidApiKey,
    ApiKeyQuotaExhausted,
    ApiKeyCapabilityDisabled,
    MissingToken,
    InvalidToken,
    InsufficientPermissions,
    UserNotFound,
    PrivacyDenied,
    NameRequired,
    Internal,
}

impl Lang {
    /// Resolve a message to its localized text.
    pub fn msg(&self, msg: Msg) -> &'static str {
        match self {
            Lang::Pt => match msg {
                Msg::ComponentUpdated => "Componente atualizado com sucesso",
                Msg::ComponentPublished => "Componente publicado com sucesso",
                Msg::ComponentUnpublished => "Componente despublicado com sucesso",
                Msg::ComponentBought => "Componente comprado com sucesso",
                Msg::ComponentSold => "Componente vendido com sucesso",
                Msg::ComponentTrashed => "Componente movido para a lixeira",
                Msg::ComponentRestored => "Componente restaurado com sucesso",
                Msg::ComponentPurged => "Componente excluído permanentemente",
                Msg::TrashCleared => "Lixeira esvaziada com sucesso",
                Msg::InsufficientArkhoins => "Arkhoins insuficientes",
                Msg::ComponentNotFound => "Componente não encontrado",
                Msg::ComponentNotTrashed => "O componente não está na lixeira",
                Msg::ComponentAlreadyTrashed => "O componente já está na lixeira",
                Msg::ComponentNotPublic => "O componente não é público",
                Msg::ComponentAlreadyPublic => "O componente já é público",
                Msg::ComponentNotOwned => "Você não possui este componente",
                Msg::ComponentAlreadyOwned => "Você já possui este componente",
                Msg::ComponentOwnerCannotBuy => {
                    "O dono não pode comprar o próprio componente"
                }
                Msg::ComponentOwnerCannotSell => {
                    "O dono não pode vender o próprio componente"
                }
                Msg::InvalidSearchPattern => "Padrão de busca inválido",
                Msg::InvalidCredentials => "Usuário ou senha inválidos",
                Msg::InvalidApiKey => "Chave de API inválida",
                Msg::ApiKeyQuotaExhausted => "Cota de uso da chave de API esgotada",
                Msg::ApiKeyCapabilityDisabled => {
                    "Esta chave de API não permite esta operação"
                }
                Msg::MissingToken => "Token de autenticação ausente",
                Msg::InvalidToken => "Token de autenticação inválido ou expirado",
                Msg::InsufficientPermissions => "Permissões insuficientes",
                Msg::UserNotFound => "Usuário não encontrado",
                Msg::PrivacyDenied => "Este usuário mantém essas informações privadas",
                Msg::NameRequired => "O nome é obrigatório",
                Msg::Internal => "Erro interno do servidor",
            },
            Lang::En => match msg {
                Msg::ComponentUpdated => "Component updated successfully",
                Msg::ComponentPublished => "Component published successfully",
                Msg::ComponentUnpublished => "Component unpublished successfully",
                Msg::ComponentBought => "Component bought successfully",
                Msg::ComponentSold => "Component sold successfully",
                Msg::ComponentTrashed => "Component moved to trash",
                Msg::ComponentRestored => "Component restored successfully",
                Msg::ComponentPurged => "Component permanently deleted",
                Msg::TrashCleared => "Trash cleared successfully",
                Msg::InsufficientArkhoins => "Insufficient arkhoins",
                Msg::ComponentNotFound => "Component not found",
                Msg::ComponentNotTrashed => "Component is not in the trash",
                Msg::ComponentAlreadyTrashed => "Component is already in the trash",
                Msg::ComponentNotPublic => "Component is not public",
                Msg::ComponentAlreadyPublic => "Component is already public",
                Msg::ComponentNotOwned => "You do not own this component",
                Msg::ComponentAlreadyOwned => "You already own this component",
                Msg::ComponentOwnerCannotBuy => "The owner cannot buy their own component",
                Msg::ComponentOwnerCannotSell => "The owner cannot sell their own component",
                Msg::InvalidSearchPattern => "Invalid search pattern",
                Msg::InvalidCredentials => "Invalid username or password",
                Msg::InvalidApiKey => "Invalid API key",
                Msg::ApiKeyQuotaExhausted => "API key usage quota exhausted",
                Msg::ApiKeyCapabilityDisabled => "This API key does not allow this operation",
                Msg::MissingToken => "Missing authentication token",
                Msg::InvalidToken => "Invalid or expired authentication token",
                Msg::InsufficientPermissions => "Insufficient permissions",
                Msg::UserNotFound => "User not found",
                Msg::PrivacyDenied => "This user keeps that information private",
                Msg::NameRequired => "Name is required",
                Msg::Internal => "Internal server error",
            },
            Lang::Ru => match msg {
                Msg::ComponentUpdated => "Компонент успешно обновлён",
                Msg::ComponentPublished => "Компонент успешно опубликован",
                Msg::ComponentUnpublished => "Публикация компонента отменена",
                Msg::ComponentBought => "Компонент успешно куплен",
                Msg::ComponentSold => "Компонент успешно продан",
                Msg::ComponentTrashed => "Компонент перемещён в корзину",
                Msg::ComponentRestored => "Компонент успешно восстановлен",
                Msg::ComponentPurged => "Компонент удалён безвозвратно",
                Msg::TrashCleared => "Корзина очищена",
                Msg::InsufficientArkhoins => "Недостаточно аркоинов",
                Msg::ComponentNotFound => "Компонент не найден",
                Msg::ComponentNotTrashed => "Компонент не находится в корзине",
                Msg::ComponentAlreadyTrashed => "Компонент уже находится в корзине",
                Msg::ComponentNotPublic => "Компонент не является публичным",
                Msg::ComponentAlreadyPublic => "Компонент уже опубликован",
                Msg::ComponentNotOwned => "Вы не владеете этим компонентом",
                Msg::ComponentAlreadyOwned => "Вы уже владеете этим компонентом",
                Msg::ComponentOwnerCannotBuy => {
                    "Владелец не может купить собственный компонент"
                }
                Msg::ComponentOwnerCannotSell => {
                    "Владелец не может продать собственный компонент"
                }
                Msg::InvalidSearchPattern => "Неверный шаблон поиска",
                Msg::InvalidCredentials => "Неверное имя пользователя или пароль",
                Msg::InvalidApiKey => "Неверный ключ API",
                Msg::ApiKeyQuotaExhausted => "Исчерпана квота использования ключа API",
                Msg::ApiKeyCapabilityDisabled => "Этот ключ API не разрешает эту операцию",
                Msg::MissingToken => "Отсутствует токен аутентификации",
                Msg::InvalidToken => "Недействительный или просроченный токен",
                Msg::InsufficientPermissions => "Недостаточно прав",
                Msg::UserNotFound => "Пользователь не найден",
                Msg::PrivacyDenied => "Пользователь скрывает эту информацию",
                Msg::NameRequired => "Имя обязательно",
                Msg::Internal => "Внутренняя ошибка сервера",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_parsing_defaults_to_portuguese() {
        assert_eq!(Lang::from_header(None), Lang::Pt);
        assert_eq!(Lang::from_header(Some("pt")), Lang::Pt);
        assert_eq!(Lang::from_header(Some("EN")), Lang::En);
        assert_eq!(Lang::from_header(Some(" ru ")), Lang::Ru);
        assert_eq!(Lang::from_header(Some("fr")), Lang::Pt);
    }

    #[test]
    fn every_language_answers_every_message() {
        for lang in [Lang::Pt, Lang::En, Lang::Ru] {
            assert!(!lang.msg(Msg::ComponentNotFound).is_empty());
            assert!(!lang.msg(Msg::InsufficientArkhoins).is_empty());
            assert!(!lang.msg(Msg::Internal).is_empty());
        }
    }
}
